use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use plaza_db::DbError;

use crate::auth::{AppState, db_call};
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session";

/// The signed-in user, inserted as a request extension by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// Resolve a session token to its user. Unknown or expired tokens are 401.
pub(crate) async fn resolve_session(state: &AppState, token: String) -> Result<Uuid, ApiError> {
    db_call(state, move |db| match db.sessions().get_user(&token) {
        Ok(user_id) => Ok(user_id),
        Err(DbError::NotFound(_)) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    })
    .await
}

/// Accept a session token from the Authorization header or the session cookie.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let id = resolve_session(&state, token.clone()).await?;

    req.extensions_mut().insert(CurrentUser { id, token });
    Ok(next.run(req).await)
}
