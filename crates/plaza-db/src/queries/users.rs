use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueryExt, affected};
use crate::models::{
    BRIEF_COLUMNS, NewUser, ProfileUpdate, RowExt, USER_COLUMNS, UserBrief, UserRow,
};
use crate::queries::page;
use crate::{Database, DbError, Result};

pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Emails are unique regardless of case.
    pub fn create(&self, new: NewUser) -> Result<UserRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name, date_of_birth,
                                    nickname, about_me, avatar, is_private)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.to_string(),
                    new.email.trim(),
                    new.password_hash,
                    new.first_name,
                    new.last_name,
                    new.date_of_birth.to_string(),
                    new.nickname,
                    new.about_me,
                    new.avatar,
                    new.is_private,
                ],
            )
            .unique("user")?;

            query_user_by_id(conn, id)
        })
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<UserRow> {
        self.db.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_by_email(&self, email: &str) -> Result<UserRow> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"),
                [email.trim()],
                UserRow::from_row,
            )
            .found("user")
        })
    }

    pub fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<UserRow> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "UPDATE users SET
                    first_name    = COALESCE(?2, first_name),
                    last_name     = COALESCE(?3, last_name),
                    date_of_birth = COALESCE(?4, date_of_birth),
                    nickname      = CASE WHEN ?5 THEN ?6 ELSE nickname END,
                    about_me      = CASE WHEN ?7 THEN ?8 ELSE about_me END,
                    avatar        = CASE WHEN ?9 THEN ?10 ELSE avatar END
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    update.first_name,
                    update.last_name,
                    update.date_of_birth.map(|d| d.to_string()),
                    update.nickname.is_some(),
                    update.nickname.flatten(),
                    update.about_me.is_some(),
                    update.about_me.flatten(),
                    update.avatar.is_some(),
                    update.avatar.flatten(),
                ],
            )?;
            affected(rows, "user")?;

            query_user_by_id(conn, id)
        })
    }

    /// Switching a profile to public accepts every pending follow request
    /// towards it. Returns the followers whose requests were accepted.
    pub fn set_privacy(&self, id: Uuid, is_private: bool) -> Result<Vec<Uuid>> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let rows = tx.execute(
                "UPDATE users SET is_private = ?2 WHERE id = ?1",
                params![id.to_string(), is_private],
            )?;
            affected(rows, "user")?;

            let accepted = if is_private {
                Vec::new()
            } else {
                let mut stmt = tx.prepare(
                    "UPDATE followers SET status = 'accepted'
                     WHERE following_id = ?1 AND status = 'pending'
                     RETURNING follower_id",
                )?;
                let ids = stmt
                    .query_map([id.to_string()], |row| row.parsed(0))?
                    .collect::<std::result::Result<Vec<Uuid>, _>>()?;
                ids
            };

            tx.commit()?;

            if !accepted.is_empty() {
                debug!("Auto-accepted {} follow requests for {}", accepted.len(), id);
            }
            Ok(accepted)
        })
    }

    /// Prefix match on first name, last name, full name, nickname or email.
    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<UserBrief>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DbError::InvalidInput("search query is empty".into()));
        }
        let pattern = format!("{}%", escape_like(query));

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRIEF_COLUMNS} FROM users u
                 WHERE u.first_name LIKE ?1 ESCAPE '\\'
                    OR u.last_name LIKE ?1 ESCAPE '\\'
                    OR (u.first_name || ' ' || u.last_name) LIKE ?1 ESCAPE '\\'
                    OR u.nickname LIKE ?1 ESCAPE '\\'
                    OR u.email LIKE ?1 ESCAPE '\\'
                 ORDER BY u.first_name, u.last_name
                 LIMIT ?2"
            ))?;

            let rows = stmt
                .query_map(params![pattern, page(limit)], |row| UserBrief::from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<UserBrief>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRIEF_COLUMNS} FROM users u
                 ORDER BY u.created_at DESC, u.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;

            let rows = stmt
                .query_map(params![page(limit), offset], |row| UserBrief::from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            affected(rows, "user")
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<UserRow> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        [id.to_string()],
        UserRow::from_row,
    )
    .found("user")
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
