use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse};
use crate::models::ChatTarget;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the session was accepted
    Ready { user_id: Uuid },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },

    /// A direct or group chat message was stored
    MessageCreate { message: MessageResponse },

    /// A notification was created for the receiving user
    NotificationCreate { notification: NotificationResponse },

    /// Someone is typing in a chat the receiver is part of
    TypingStart { from_user_id: Uuid, target: ChatTarget },

    /// A command from this client was rejected
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Store and deliver a chat message
    SendMessage { target: ChatTarget, content: String },

    /// Indicate typing in a chat
    StartTyping { target: ChatTarget },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"SendMessage",
                 "data":{{"target":{{"kind":"user","id":"{id}"}},"content":"hi"}}}}"#
        );

        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::SendMessage { target, content } => {
                assert_eq!(target, ChatTarget::User(id));
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn event_is_tagged_with_type() {
        let user_id = Uuid::new_v4();
        let event = GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "PresenceUpdate");
        assert_eq!(json["data"]["online"], true);
    }
}
