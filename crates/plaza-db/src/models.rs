//! Database row types. These map directly to SQLite rows.
//! Distinct from plaza-types API models to keep the DB layer independent.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use plaza_types::models::{
    Attendance, ChatTarget, MemberRole, NotificationKind, PostPrivacy, RequestStatus,
};

/// Same layout SQLite produces with `strftime('%Y-%m-%d %H:%M:%f', 'now')`,
/// so stored values compare correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts RFC 3339 as well as the naive UTC layout SQLite writes, with or
/// without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
    })
}

/// Typed column accessors for TEXT-encoded values.
pub(crate) trait RowExt {
    fn parsed<T>(&self, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static;

    fn parsed_opt<T>(&self, idx: usize) -> rusqlite::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static;

    fn timestamp(&self, idx: usize) -> rusqlite::Result<DateTime<Utc>>;
}

impl RowExt for Row<'_> {
    fn parsed<T>(&self, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = self.get(idx)?;
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn parsed_opt<T>(&self, idx: usize) -> rusqlite::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get::<_, Option<String>>(idx)? {
            Some(raw) => raw.parse().map(Some).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            }),
            None => Ok(None),
        }
    }

    fn timestamp(&self, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = self.get(idx)?;
        parse_timestamp(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }
}

// -- Users --

/// Columns: id, email, password, first_name, last_name, date_of_birth,
/// nickname, about_me, avatar, is_private, created_at.
pub(crate) const USER_COLUMNS: &str = "u.id, u.email, u.password, u.first_name, u.last_name, \
     u.date_of_birth, u.nickname, u.about_me, u.avatar, u.is_private, u.created_at";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            date_of_birth: row.parsed(5)?,
            nickname: row.get(6)?,
            about_me: row.get(7)?,
            avatar: row.get(8)?,
            is_private: row.get(9)?,
            created_at: row.timestamp(10)?,
        })
    }

    pub fn brief(&self) -> UserBrief {
        UserBrief {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_private: bool,
}

/// `None` fields are left unchanged. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nickname: Option<Option<String>>,
    pub about_me: Option<Option<String>>,
    pub avatar: Option<Option<String>>,
}

/// Public identity of a user, joined into most other rows.
pub(crate) const BRIEF_COLUMNS: &str = "u.id, u.first_name, u.last_name, u.nickname, u.avatar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBrief {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

impl UserBrief {
    /// Reads the five `BRIEF_COLUMNS` starting at `start`.
    pub(crate) fn from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(start)?,
            first_name: row.get(start + 1)?,
            last_name: row.get(start + 2)?,
            nickname: row.get(start + 3)?,
            avatar: row.get(start + 4)?,
        })
    }
}

// -- Posts --

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: Uuid,
    pub author: UserBrief,
    pub group_id: Option<Uuid>,
    pub content: String,
    pub image: Option<String>,
    pub privacy: PostPrivacy,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub group_id: Option<Uuid>,
    pub content: String,
    pub image: Option<String>,
    pub privacy: PostPrivacy,
    pub allowed_user_ids: Vec<Uuid>,
}

// -- Comments --

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: UserBrief,
    pub content: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub image: Option<String>,
}

// -- Groups --

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user: UserBrief,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InvitationRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_title: String,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JoinRequestRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user: UserBrief,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// -- Group events --

#[derive(Debug, Clone)]
pub struct GroupEventRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
    pub going: i64,
    pub not_going: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGroupEvent {
    pub group_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttendeeRow {
    pub user: UserBrief,
    pub response: Attendance,
}

// -- Messages --

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub sender: UserBrief,
    pub target: ChatTarget,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub partner: UserBrief,
    pub last_message_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub actor_id: Option<Uuid>,
    pub reference_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub actor_id: Option<Uuid>,
    pub reference_id: Option<Uuid>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn parses_sqlite_layouts() {
        let with_millis = parse_timestamp("2024-03-01 10:20:30.456").unwrap();
        assert_eq!(with_millis.second(), 30);
        assert_eq!(with_millis.timestamp_subsec_millis(), 456);

        let plain = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(plain.day(), 1);

        let rfc = parse_timestamp("2024-03-01T10:20:30Z").unwrap();
        assert_eq!(rfc, plain);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn formatted_timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(parse_timestamp(&format_timestamp(late)).unwrap(), late);
    }
}
