use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use plaza_db::Database;
use plaza_types::events::{GatewayCommand, GatewayEvent};

use crate::GatewayError;
use crate::chat;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

/// Handle a WebSocket whose session was validated at the HTTP upgrade.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    // Register before going online so nothing targeted at us is missed
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    let mut hello = vec![GatewayEvent::Ready { user_id }];
    for uid in dispatcher.online_users().await {
        hello.push(GatewayEvent::PresenceUpdate {
            user_id: uid,
            online: true,
        });
    }
    for event in &hello {
        let Some(msg) = encode(event) else { continue };
        if sender.send(msg).await.is_err() {
            dispatcher.unregister_user_channel(user_id, conn_id).await;
            return;
        }
    }

    dispatcher.user_online(user_id).await;

    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event = tokio::select! {
                result = broadcast_rx.recv() => match result {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver lagged by {} events", n);
                        continue;
                    }
                    Err(_) => break,
                },
                result = user_rx.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(msg) = encode(&event) else { continue };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Err(e) = handle_command(&db, &dispatcher_recv, user_id, cmd).await {
                            reject(&dispatcher_recv, user_id, e.to_string()).await;
                        }
                    }
                    Err(e) => {
                        warn!("{} sent a bad command: {}", user_id, e);
                        reject(&dispatcher_recv, user_id, format!("bad command: {e}")).await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn handle_command(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    user_id: Uuid,
    cmd: GatewayCommand,
) -> Result<(), GatewayError> {
    match cmd {
        GatewayCommand::SendMessage { target, content } => {
            chat::send_message(db, dispatcher, user_id, target, content).await?;
        }
        GatewayCommand::StartTyping { target } => {
            chat::start_typing(db, dispatcher, user_id, target).await?;
        }
    }
    Ok(())
}

async fn reject(dispatcher: &Dispatcher, user_id: Uuid, message: String) {
    dispatcher
        .send_to_user(user_id, GatewayEvent::Error { message })
        .await;
}
