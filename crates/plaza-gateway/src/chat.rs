use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use plaza_db::Database;
use plaza_db::models::NewNotification;
use plaza_types::api::MessageResponse;
use plaza_types::events::GatewayEvent;
use plaza_types::models::{ChatTarget, NotificationKind};

use crate::dispatcher::Dispatcher;
use crate::notifier::notify;
use crate::{GatewayError, blocking};

const FOLLOWERS_ONLY: &str = "this user only accepts messages from followers";

/// Store a chat message and deliver it to everyone in the conversation,
/// sender included so their other views stay in sync. Offline receivers of
/// a direct message get a notification instead.
pub async fn send_message(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    sender: Uuid,
    target: ChatTarget,
    content: String,
) -> Result<MessageResponse, GatewayError> {
    let (row, recipients) = blocking(db, move |db| {
        let recipients = match target {
            ChatTarget::User(receiver) => {
                if !db.messages().can_message(sender, receiver)? {
                    return Err(GatewayError::Forbidden(FOLLOWERS_ONLY));
                }
                vec![receiver, sender]
            }
            ChatTarget::Group(group) => {
                if !db.groups().is_member(group, sender)? {
                    return Err(GatewayError::Forbidden("only group members can chat here"));
                }
                db.groups().member_ids(group)?
            }
        };

        let row = match target {
            ChatTarget::User(receiver) => db.messages().send_direct(sender, receiver, &content)?,
            ChatTarget::Group(group) => db.messages().send_group(sender, group, &content)?,
        };
        Ok((row, recipients))
    })
    .await?;

    let message: MessageResponse = row.into();
    debug!("Message {} from {} to {:?}", message.id, sender, target);

    dispatcher
        .send_to_users(&recipients, GatewayEvent::MessageCreate { message: message.clone() })
        .await;

    if let ChatTarget::User(receiver) = target {
        if !dispatcher.is_online(receiver).await {
            notify(
                db,
                dispatcher,
                NewNotification {
                    user_id: receiver,
                    kind: NotificationKind::NewMessage,
                    actor_id: Some(sender),
                    reference_id: Some(message.id),
                    message: format!("New message from {}", message.sender.first_name),
                },
            )
            .await;
        }
    }

    Ok(message)
}

/// Forward a typing indicator. The receiver sees the chat from their side,
/// so a direct chat is identified by the typist.
pub async fn start_typing(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    from: Uuid,
    target: ChatTarget,
) -> Result<(), GatewayError> {
    match target {
        ChatTarget::User(receiver) => {
            let allowed =
                blocking(db, move |db| Ok(db.messages().can_message(from, receiver)?)).await?;
            if !allowed {
                return Err(GatewayError::Forbidden(FOLLOWERS_ONLY));
            }

            dispatcher
                .send_to_user(
                    receiver,
                    GatewayEvent::TypingStart {
                        from_user_id: from,
                        target: ChatTarget::User(from),
                    },
                )
                .await;
        }
        ChatTarget::Group(group) => {
            let members = blocking(db, move |db| {
                if !db.groups().is_member(group, from)? {
                    return Err(GatewayError::Forbidden("only group members can chat here"));
                }
                Ok(db.groups().member_ids(group)?)
            })
            .await?;

            let others: Vec<Uuid> = members.into_iter().filter(|id| *id != from).collect();
            dispatcher
                .send_to_users(&others, GatewayEvent::TypingStart { from_user_id: from, target })
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use plaza_db::models::NewUser;

    fn seed_user(db: &Database, name: &str, is_private: bool) -> Uuid {
        db.users()
            .create(NewUser {
                email: format!("{name}@example.com"),
                password_hash: "x".to_string(),
                first_name: name.to_string(),
                last_name: "Tester".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                nickname: None,
                about_me: None,
                avatar: None,
                is_private,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn direct_message_reaches_both_sides() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let alice = seed_user(&db, "alice", false);
        let bob = seed_user(&db, "bob", false);

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;
        dispatcher.user_online(bob).await;

        let sent = send_message(&db, &dispatcher, alice, ChatTarget::User(bob), "hey".into())
            .await
            .unwrap();
        assert_eq!(sent.target, ChatTarget::User(bob));

        assert!(matches!(alice_rx.try_recv(), Ok(GatewayEvent::MessageCreate { .. })));
        assert!(matches!(bob_rx.try_recv(), Ok(GatewayEvent::MessageCreate { .. })));
        // Bob is online, so no notification
        assert_eq!(db.notifications().unread_count(bob).unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_receiver_gets_notification() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let alice = seed_user(&db, "alice", false);
        let bob = seed_user(&db, "bob", false);

        send_message(&db, &dispatcher, alice, ChatTarget::User(bob), "you there?".into())
            .await
            .unwrap();
        assert_eq!(db.notifications().unread_count(bob).unwrap(), 1);
    }

    #[tokio::test]
    async fn private_user_rejects_strangers() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let alice = seed_user(&db, "alice", false);
        let shy = seed_user(&db, "shy", true);

        let err = send_message(&db, &dispatcher, alice, ChatTarget::User(shy), "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
        assert!(db.messages().list_direct(alice, shy, 10, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_chat_requires_membership_and_fans_out() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let owner = seed_user(&db, "owner", false);
        let member = seed_user(&db, "member", false);
        let outsider = seed_user(&db, "outsider", false);
        let group = db.groups().create(owner, "Band", "").unwrap();
        db.groups()
            .add_member(group.id, member, plaza_types::models::MemberRole::Member)
            .unwrap();

        let (_, mut member_rx) = dispatcher.register_user_channel(member).await;
        let (_, mut outsider_rx) = dispatcher.register_user_channel(outsider).await;

        send_message(&db, &dispatcher, owner, ChatTarget::Group(group.id), "practice!".into())
            .await
            .unwrap();
        assert!(matches!(member_rx.try_recv(), Ok(GatewayEvent::MessageCreate { .. })));
        assert!(outsider_rx.try_recv().is_err());

        let target = ChatTarget::Group(group.id);
        let err = send_message(&db, &dispatcher, outsider, target, "me too".into())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));

        start_typing(&db, &dispatcher, owner, ChatTarget::Group(group.id)).await.unwrap();
        assert!(matches!(member_rx.try_recv(), Ok(GatewayEvent::TypingStart { .. })));
    }
}
