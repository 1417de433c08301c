use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use plaza_types::models::Attendance;

use crate::error::QueryExt;
use crate::models::{
    AttendeeRow, BRIEF_COLUMNS, GroupEventRow, NewGroupEvent, RowExt, UserBrief, format_timestamp,
};
use crate::{Database, Result};

const EVENT_SELECT: &str = "
    SELECT e.id, e.group_id, e.creator_id, e.title, e.description, e.event_time, e.created_at,
           (SELECT COUNT(*) FROM event_responses r
            WHERE r.event_id = e.id AND r.response = 'going'),
           (SELECT COUNT(*) FROM event_responses r
            WHERE r.event_id = e.id AND r.response = 'not_going')
    FROM group_events e";

impl GroupEventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            group_id: row.parsed(1)?,
            creator_id: row.parsed(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            event_time: row.timestamp(5)?,
            created_at: row.timestamp(6)?,
            going: row.get(7)?,
            not_going: row.get(8)?,
        })
    }
}

pub struct GroupEventRepository<'a> {
    db: &'a Database,
}

impl<'a> GroupEventRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: NewGroupEvent) -> Result<GroupEventRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO group_events (id, group_id, creator_id, title, description, event_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    new.group_id.to_string(),
                    new.creator_id.to_string(),
                    new.title,
                    new.description,
                    format_timestamp(new.event_time),
                ],
            )?;
            query_event(conn, id)
        })
    }

    pub fn get(&self, id: Uuid) -> Result<GroupEventRow> {
        self.db.with_conn(|conn| query_event(conn, id))
    }

    /// Soonest first.
    pub fn list_by_group(&self, group: Uuid) -> Result<Vec<GroupEventRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{EVENT_SELECT} WHERE e.group_id = ?1 ORDER BY e.event_time ASC"
            ))?;
            let rows = stmt
                .query_map([group.to_string()], GroupEventRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Records or changes the user's answer.
    pub fn respond(&self, event: Uuid, user: Uuid, response: Attendance) -> Result<GroupEventRow> {
        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO event_responses (event_id, user_id, response) VALUES (?1, ?2, ?3)
                 ON CONFLICT (event_id, user_id) DO UPDATE SET
                    response = excluded.response,
                    updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
                params![event.to_string(), user.to_string(), response.as_str()],
            )?;
            query_event(conn, event)
        })
    }

    pub fn responses(&self, event: Uuid) -> Result<Vec<AttendeeRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT r.response, {BRIEF_COLUMNS}
                 FROM event_responses r
                 JOIN users u ON u.id = r.user_id
                 WHERE r.event_id = ?1
                 ORDER BY r.updated_at ASC"
            ))?;
            let rows = stmt
                .query_map([event.to_string()], |row| {
                    Ok(AttendeeRow {
                        response: row.parsed(0)?,
                        user: UserBrief::from_row(row, 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_event(conn: &Connection, id: Uuid) -> Result<GroupEventRow> {
    conn.query_row(
        &format!("{EVENT_SELECT} WHERE e.id = ?1"),
        [id.to_string()],
        GroupEventRow::from_row,
    )
    .found("event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::queries::test_support::{db, user};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn create_list_and_respond() {
        let db = db();
        let owner = user(&db, "owner");
        let guest = user(&db, "guest");
        let group = db.groups().create(owner.id, "Hikers", "").unwrap();

        let when = Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap();
        let later = db
            .group_events()
            .create(NewGroupEvent {
                group_id: group.id,
                creator_id: owner.id,
                title: "Summit".to_string(),
                description: "bring water".to_string(),
                event_time: when + Duration::days(7),
            })
            .unwrap();
        let sooner = db
            .group_events()
            .create(NewGroupEvent {
                group_id: group.id,
                creator_id: owner.id,
                title: "Warm-up".to_string(),
                description: String::new(),
                event_time: when,
            })
            .unwrap();
        assert_eq!(sooner.event_time, when);

        let listed = db.group_events().list_by_group(group.id).unwrap();
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![sooner.id, later.id]);

        db.group_events().respond(later.id, owner.id, Attendance::Going).unwrap();
        db.group_events().respond(later.id, guest.id, Attendance::Going).unwrap();
        let updated = db.group_events().respond(later.id, guest.id, Attendance::NotGoing).unwrap();
        assert_eq!((updated.going, updated.not_going), (1, 1));

        let responses = db.group_events().responses(later.id).unwrap();
        assert_eq!(responses.len(), 2);
        let guest_answer = responses.iter().find(|r| r.user.id == guest.id).unwrap();
        assert_eq!(guest_answer.response, Attendance::NotGoing);
    }

    #[test]
    fn missing_event_is_not_found() {
        let db = db();
        assert!(matches!(db.group_events().get(Uuid::new_v4()), Err(DbError::NotFound("event"))));

        let someone = user(&db, "someone");
        assert!(matches!(
            db.group_events().respond(Uuid::new_v4(), someone.id, Attendance::Going),
            Err(DbError::InvalidReference)
        ));
    }
}
