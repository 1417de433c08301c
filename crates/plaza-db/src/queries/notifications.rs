use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use crate::error::{QueryExt, affected};
use crate::models::{NewNotification, NotificationRow, RowExt};
use crate::queries::page;
use crate::{Database, Result};

const NOTIFICATION_SELECT: &str = "
    SELECT id, user_id, kind, actor_id, reference_id, message, is_read, created_at
    FROM notifications";

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            user_id: row.parsed(1)?,
            kind: row.parsed(2)?,
            actor_id: row.parsed_opt(3)?,
            reference_id: row.parsed_opt(4)?,
            message: row.get(5)?,
            is_read: row.get(6)?,
            created_at: row.timestamp(7)?,
        })
    }
}

pub struct NotificationRepository<'a> {
    db: &'a Database,
}

impl<'a> NotificationRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: NewNotification) -> Result<NotificationRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, actor_id, reference_id, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    new.user_id.to_string(),
                    new.kind.as_str(),
                    new.actor_id.map(|a| a.to_string()),
                    new.reference_id.map(|r| r.to_string()),
                    new.message,
                ],
            )?;
            query_notification(conn, id)
        })
    }

    /// Newest first.
    pub fn list(
        &self,
        user: Uuid,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{NOTIFICATION_SELECT}
                 WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;

            let rows = stmt
                .query_map(
                    params![user.to_string(), unread_only, page(limit), offset],
                    NotificationRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_count(&self, user: Uuid) -> Result<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    /// Someone else's notification is reported as missing.
    pub fn mark_read(&self, id: Uuid, user: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user.to_string()],
            )?;
            affected(rows, "notification")
        })
    }

    /// Returns how many notifications changed.
    pub fn mark_all_read(&self, user: Uuid) -> Result<usize> {
        self.db.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user.to_string()],
            )?)
        })
    }

    pub fn delete(&self, id: Uuid, user: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user.to_string()],
            )?;
            affected(rows, "notification")
        })
    }
}

fn query_notification(conn: &Connection, id: Uuid) -> Result<NotificationRow> {
    conn.query_row(
        &format!("{NOTIFICATION_SELECT} WHERE id = ?1"),
        [id.to_string()],
        NotificationRow::from_row,
    )
    .found("notification")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::queries::test_support::{db, user};
    use plaza_types::models::NotificationKind;

    fn notify(db: &Database, to: Uuid, from: Uuid) -> NotificationRow {
        db.notifications()
            .create(NewNotification {
                user_id: to,
                kind: NotificationKind::NewFollower,
                actor_id: Some(from),
                reference_id: None,
                message: "someone followed you".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn unread_tracking() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        let first = notify(&db, a.id, b.id);
        notify(&db, a.id, b.id);
        assert_eq!(first.kind, NotificationKind::NewFollower);
        assert!(!first.is_read);
        assert_eq!(db.notifications().unread_count(a.id).unwrap(), 2);

        db.notifications().mark_read(first.id, a.id).unwrap();
        assert_eq!(db.notifications().unread_count(a.id).unwrap(), 1);
        assert_eq!(db.notifications().list(a.id, true, 50, 0).unwrap().len(), 1);
        assert_eq!(db.notifications().list(a.id, false, 50, 0).unwrap().len(), 2);

        assert_eq!(db.notifications().mark_all_read(a.id).unwrap(), 1);
        assert_eq!(db.notifications().unread_count(a.id).unwrap(), 0);
    }

    #[test]
    fn other_users_cannot_touch_notifications() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let n = notify(&db, a.id, b.id);

        assert!(matches!(
            db.notifications().mark_read(n.id, b.id),
            Err(DbError::NotFound("notification"))
        ));
        assert!(matches!(
            db.notifications().delete(n.id, b.id),
            Err(DbError::NotFound("notification"))
        ));

        db.notifications().delete(n.id, a.id).unwrap();
        assert!(db.notifications().list(a.id, false, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn deleting_actor_keeps_notification() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        notify(&db, a.id, b.id);

        db.users().delete(b.id).unwrap();
        let remaining = db.notifications().list(a.id, false, 50, 0).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].actor_id, None);
    }
}
