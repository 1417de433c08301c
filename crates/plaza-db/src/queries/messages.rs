use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use plaza_types::models::ChatTarget;

use crate::error::QueryExt;
use crate::models::{
    BRIEF_COLUMNS, ConversationRow, MessageRow, RowExt, UserBrief, format_timestamp,
};
use crate::queries::page;
use crate::{Database, DbError, Result};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Oldest message already loaded. Messages sharing a millisecond are ordered
/// by insertion; with `id` unset, all of them at `created_at` are excluded.
#[derive(Debug, Clone, Copy)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Option<Uuid>,
}

/// `?n` is the cursor timestamp and `?m` the cursor message id.
fn cursor_clause(n: u8, m: u8) -> String {
    format!(
        "(?{n} IS NULL
          OR m.created_at < ?{n}
          OR (m.created_at = ?{n}
              AND m.rowid < (SELECT rowid FROM messages WHERE id = ?{m})))"
    )
}

fn cursor_params(before: Option<MessageCursor>) -> (Option<String>, Option<String>) {
    match before {
        Some(cursor) => (
            Some(format_timestamp(cursor.created_at)),
            cursor.id.map(|id| id.to_string()),
        ),
        None => (None, None),
    }
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let receiver: Option<Uuid> = row.parsed_opt(1)?;
        let group: Option<Uuid> = row.parsed_opt(2)?;
        let target = match (receiver, group) {
            (Some(user), None) => ChatTarget::User(user),
            (None, Some(group)) => ChatTarget::Group(group),
            _ => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    1,
                    Type::Text,
                    "message must have exactly one of receiver_id and group_id".into(),
                ));
            }
        };

        Ok(Self {
            id: row.parsed(0)?,
            target,
            content: row.get(3)?,
            created_at: row.timestamp(4)?,
            sender: UserBrief::from_row(row, 5)?,
        })
    }
}

fn message_select() -> String {
    format!(
        "SELECT m.id, m.receiver_id, m.group_id, m.content, m.created_at, {BRIEF_COLUMNS}
         FROM messages m
         JOIN users u ON u.id = m.sender_id"
    )
}

/// Append-only chat history, direct or group scoped.
pub struct MessageRepository<'a> {
    db: &'a Database,
}

impl<'a> MessageRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn send_direct(&self, sender: Uuid, receiver: Uuid, content: &str) -> Result<MessageRow> {
        if sender == receiver {
            return Err(DbError::InvalidInput("cannot message yourself".into()));
        }
        self.insert(sender, ChatTarget::User(receiver), content)
    }

    pub fn send_group(&self, sender: Uuid, group: Uuid, content: &str) -> Result<MessageRow> {
        self.insert(sender, ChatTarget::Group(group), content)
    }

    /// Newest first. `before` pages backwards through older messages.
    pub fn list_direct(
        &self,
        a: Uuid,
        b: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<MessageRow>> {
        let (before_at, before_id) = cursor_params(before);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
                        OR (m.sender_id = ?2 AND m.receiver_id = ?1))
                   AND {}
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?5",
                message_select(),
                cursor_clause(3, 4)
            ))?;

            let rows = stmt
                .query_map(
                    params![a.to_string(), b.to_string(), before_at, before_id, page(limit)],
                    MessageRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_group(
        &self,
        group: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<MessageRow>> {
        let (before_at, before_id) = cursor_params(before);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.group_id = ?1
                   AND {}
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?4",
                message_select(),
                cursor_clause(2, 3)
            ))?;

            let rows = stmt
                .query_map(
                    params![group.to_string(), before_at, before_id, page(limit)],
                    MessageRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Everyone `user` has exchanged direct messages with, most recent first.
    pub fn list_conversations(&self, user: Uuid) -> Result<Vec<ConversationRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT c.last_at, {BRIEF_COLUMNS}
                 FROM (
                     SELECT partner_id, MAX(created_at) AS last_at FROM (
                         SELECT receiver_id AS partner_id, created_at FROM messages
                         WHERE sender_id = ?1 AND receiver_id IS NOT NULL
                         UNION ALL
                         SELECT sender_id AS partner_id, created_at FROM messages
                         WHERE receiver_id = ?1
                     )
                     GROUP BY partner_id
                 ) c
                 JOIN users u ON u.id = c.partner_id
                 ORDER BY c.last_at DESC"
            ))?;

            let rows = stmt
                .query_map([user.to_string()], |row| {
                    Ok(ConversationRow {
                        last_message_at: row.timestamp(0)?,
                        partner: UserBrief::from_row(row, 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Direct messages need a follow edge either way, or a public receiver.
    pub fn can_message(&self, sender: Uuid, receiver: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let allowed: bool = conn
                .query_row(
                    "SELECT u.is_private = 0 OR EXISTS (
                         SELECT 1 FROM followers f
                         WHERE f.status = 'accepted'
                           AND ((f.follower_id = ?1 AND f.following_id = ?2)
                             OR (f.follower_id = ?2 AND f.following_id = ?1)))
                     FROM users u WHERE u.id = ?2",
                    params![sender.to_string(), receiver.to_string()],
                    |row| row.get(0),
                )
                .found("user")?;
            Ok(allowed)
        })
    }

    fn insert(&self, sender: Uuid, target: ChatTarget, content: &str) -> Result<MessageRow> {
        let content = validate_content(content)?;
        let id = Uuid::new_v4();
        let (receiver, group) = match target {
            ChatTarget::User(user) => (Some(user.to_string()), None),
            ChatTarget::Group(group) => (None, Some(group.to_string())),
        };

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, group_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), sender.to_string(), receiver, group, content],
            )?;
            query_message(conn, id)
        })
    }
}

fn validate_content(content: &str) -> Result<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(DbError::InvalidInput("message is empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(DbError::InvalidInput(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content)
}

fn query_message(conn: &Connection, id: Uuid) -> Result<MessageRow> {
    conn.query_row(
        &format!("{} WHERE m.id = ?1", message_select()),
        [id.to_string()],
        MessageRow::from_row,
    )
    .found("message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{accepted_follow, db, private_user, user};

    #[test]
    fn direct_history_includes_both_directions() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let c = user(&db, "c");

        db.messages().send_direct(a.id, b.id, "hi b").unwrap();
        db.messages().send_direct(b.id, a.id, "hi a").unwrap();
        db.messages().send_direct(a.id, c.id, "hi c").unwrap();

        let history = db.messages().list_direct(a.id, b.id, 50, None).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi a", "hi b"]);
        assert_eq!(history[0].target, ChatTarget::User(a.id));
        assert_eq!(history[0].sender.id, b.id);
    }

    #[test]
    fn before_cursor_pages_backwards() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        let first = db.messages().send_direct(a.id, b.id, "one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = db.messages().send_direct(a.id, b.id, "two").unwrap();

        let cursor = MessageCursor {
            created_at: second.created_at,
            id: None,
        };
        let older = db.messages().list_direct(a.id, b.id, 50, Some(cursor)).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, first.id);
    }

    fn pin_created_at(db: &Database, at: &str) {
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE messages SET created_at = ?1", [at])?;
            Ok(())
        })
        .unwrap();
    }

    fn page_through(
        mut fetch: impl FnMut(Option<MessageCursor>) -> Vec<MessageRow>,
    ) -> Vec<String> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = fetch(cursor);
            let Some(last) = page.last() else { break };
            cursor = Some(MessageCursor {
                created_at: last.created_at,
                id: Some(last.id),
            });
            seen.extend(page.iter().map(|m| m.content.clone()));
        }
        seen
    }

    #[test]
    fn same_millisecond_messages_page_one_at_a_time() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        for content in ["one", "two", "three"] {
            db.messages().send_direct(a.id, b.id, content).unwrap();
        }
        pin_created_at(&db, "2024-03-01 12:00:00.000");

        let seen =
            page_through(|cursor| db.messages().list_direct(a.id, b.id, 1, cursor).unwrap());
        assert_eq!(seen, ["three", "two", "one"]);
    }

    #[test]
    fn group_history_pages_through_ties() {
        let db = db();
        let owner = user(&db, "owner");
        let group = db.groups().create(owner.id, "Band", "").unwrap();
        for content in ["one", "two", "three"] {
            db.messages().send_group(owner.id, group.id, content).unwrap();
        }
        pin_created_at(&db, "2024-03-01 12:00:00.000");

        let seen = page_through(|cursor| db.messages().list_group(group.id, 2, cursor).unwrap());
        assert_eq!(seen, ["three", "two", "one"]);
    }

    #[test]
    fn group_messages_are_scoped_to_group() {
        let db = db();
        let owner = user(&db, "owner");
        let group = db.groups().create(owner.id, "Band", "").unwrap();
        let other = db.groups().create(owner.id, "Choir", "").unwrap();

        let sent = db.messages().send_group(owner.id, group.id, "rehearsal at 8").unwrap();
        db.messages().send_group(owner.id, other.id, "elsewhere").unwrap();

        assert_eq!(sent.target, ChatTarget::Group(group.id));
        let history = db.messages().list_group(group.id, 50, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "rehearsal at 8");
    }

    #[test]
    fn content_is_validated() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        assert!(matches!(
            db.messages().send_direct(a.id, b.id, "   "),
            Err(DbError::InvalidInput(_))
        ));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            db.messages().send_direct(a.id, b.id, &long),
            Err(DbError::InvalidInput(_))
        ));
        assert!(matches!(
            db.messages().send_direct(a.id, a.id, "me"),
            Err(DbError::InvalidInput(_))
        ));
    }

    #[test]
    fn messaging_private_users_needs_a_follow() {
        let db = db();
        let a = user(&db, "a");
        let shy = private_user(&db, "shy");

        assert!(db.messages().can_message(shy.id, a.id).unwrap());
        assert!(!db.messages().can_message(a.id, shy.id).unwrap());

        accepted_follow(&db, shy.id, a.id);
        assert!(db.messages().can_message(a.id, shy.id).unwrap());
    }

    #[test]
    fn conversations_list_partners_once() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let c = user(&db, "c");

        db.messages().send_direct(a.id, b.id, "1").unwrap();
        db.messages().send_direct(b.id, a.id, "2").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.messages().send_direct(c.id, a.id, "3").unwrap();

        let conversations = db.messages().list_conversations(a.id).unwrap();
        let partners: Vec<_> = conversations.iter().map(|c| c.partner.id).collect();
        assert_eq!(partners, vec![c.id, b.id]);
    }
}
