use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use plaza_gateway::connection;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{SESSION_COOKIE, resolve_session};

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the session token
/// comes from `?token=` or the session cookie. It is checked before upgrading.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .ok_or(ApiError::Unauthorized)?;
    let user_id = resolve_session(&state, token).await?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, db, user_id)
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::test_support::TestApp;

    /// Serve the router on a loopback port. The upgrade extractor needs a
    /// real hyper connection, which `oneshot` cannot provide.
    async fn serve(app: &TestApp) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router.clone();
        tokio::spawn(async move { axum::serve(listener, router).await });
        addr
    }

    /// Send a WebSocket handshake and return the response status.
    async fn handshake(addr: std::net::SocketAddr, path: &str) -> StatusCode {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        let mut buf = [0u8; 512];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before response headers");
            head.extend_from_slice(&buf[..n]);
        }

        let head = String::from_utf8_lossy(&head);
        let code = head.split_whitespace().nth(1).unwrap();
        StatusCode::from_u16(code.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn upgrade_requires_a_live_session() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;
        let addr = serve(&app).await;

        assert_eq!(handshake(addr, "/gateway").await, StatusCode::UNAUTHORIZED);
        assert_eq!(handshake(addr, "/gateway?token=bogus").await, StatusCode::UNAUTHORIZED);

        let path = format!("/gateway?token={}", alice.token);
        assert_eq!(handshake(addr, &path).await, StatusCode::SWITCHING_PROTOCOLS);
    }

    #[tokio::test]
    async fn logged_out_token_is_refused() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;
        let (status, _) = app
            .request(axum::http::Method::POST, "/auth/logout", Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let addr = serve(&app).await;
        let path = format!("/gateway?token={}", alice.token);
        assert_eq!(handshake(addr, &path).await, StatusCode::UNAUTHORIZED);
    }
}
