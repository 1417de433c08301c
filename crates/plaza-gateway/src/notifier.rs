use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use plaza_db::Database;
use plaza_db::models::NewNotification;
use plaza_types::api::NotificationResponse;
use plaza_types::events::GatewayEvent;

use crate::blocking;
use crate::dispatcher::Dispatcher;

/// Store a notification and push it to the recipient if they are connected.
/// Failures are logged; the action that caused the notification stands.
pub async fn notify(db: &Arc<Database>, dispatcher: &Dispatcher, new: NewNotification) {
    let user_id = new.user_id;
    let kind = new.kind;

    match blocking(db, move |db| Ok(db.notifications().create(new)?)).await {
        Ok(row) => {
            let notification: NotificationResponse = row.into();
            dispatcher
                .send_to_user(user_id, GatewayEvent::NotificationCreate { notification })
                .await;
        }
        Err(e) => warn!("Failed to create {} notification for {}: {}", kind, user_id, e),
    }
}

/// Same notification for several recipients. `template.user_id` is ignored.
pub async fn notify_many(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    recipients: &[Uuid],
    template: NewNotification,
) {
    for user_id in recipients {
        let new = NewNotification {
            user_id: *user_id,
            ..template.clone()
        };
        notify(db, dispatcher, new).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use plaza_db::models::NewUser;
    use plaza_types::models::NotificationKind;

    fn seed_user(db: &Database, name: &str) -> Uuid {
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
                is_private: false,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn notification_is_stored_and_pushed() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let (_, mut rx) = dispatcher.register_user_channel(alice).await;

        notify(
            &db,
            &dispatcher,
            NewNotification {
                user_id: alice,
                kind: NotificationKind::NewFollower,
                actor_id: Some(bob),
                reference_id: None,
                message: "bob followed you".to_string(),
            },
        )
        .await;

        assert_eq!(db.notifications().unread_count(alice).unwrap(), 1);
        match rx.try_recv() {
            Ok(GatewayEvent::NotificationCreate { notification }) => {
                assert_eq!(notification.kind, NotificationKind::NewFollower);
                assert_eq!(notification.actor_id, Some(bob));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn notify_many_reaches_every_recipient() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        notify_many(
            &db,
            &dispatcher,
            &[bob, carol],
            NewNotification {
                user_id: alice,
                kind: NotificationKind::GroupEvent,
                actor_id: Some(alice),
                reference_id: None,
                message: "picnic on saturday".to_string(),
            },
        )
        .await;

        assert_eq!(db.notifications().unread_count(alice).unwrap(), 0);
        assert_eq!(db.notifications().unread_count(bob).unwrap(), 1);
        assert_eq!(db.notifications().unread_count(carol).unwrap(), 1);
        assert!(matches!(
            bob_rx.try_recv(),
            Ok(GatewayEvent::NotificationCreate { .. })
        ));
    }
}
