use rusqlite::{Connection, Row, params};
use tracing::debug;
use uuid::Uuid;

use plaza_types::models::{MemberRole, RequestStatus};

use crate::error::{QueryExt, affected};
use crate::models::{
    BRIEF_COLUMNS, GroupRow, InvitationRow, JoinRequestRow, MemberRow, RowExt, UserBrief,
};
use crate::queries::page;
use crate::{Database, DbError, Result};

const GROUP_SELECT: &str = "
    SELECT g.id, g.creator_id, g.title, g.description, g.created_at,
           (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id)
    FROM groups g";

const INVITATION_SELECT: &str = "
    SELECT i.id, i.group_id, g.title, i.inviter_id, i.invitee_id, i.status, i.created_at
    FROM group_invitations i
    JOIN groups g ON g.id = i.group_id";

fn join_request_select() -> String {
    format!(
        "SELECT r.id, r.group_id, r.status, r.created_at, {BRIEF_COLUMNS}
         FROM group_join_requests r
         JOIN users u ON u.id = r.user_id"
    )
}

impl GroupRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            creator_id: row.parsed(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            created_at: row.timestamp(4)?,
            member_count: row.get(5)?,
        })
    }
}

impl InvitationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            group_id: row.parsed(1)?,
            group_title: row.get(2)?,
            inviter_id: row.parsed(3)?,
            invitee_id: row.parsed(4)?,
            status: row.parsed(5)?,
            created_at: row.timestamp(6)?,
        })
    }
}

impl JoinRequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            group_id: row.parsed(1)?,
            status: row.parsed(2)?,
            created_at: row.timestamp(3)?,
            user: UserBrief::from_row(row, 4)?,
        })
    }
}

/// Groups, their members, and the two ways in: invitations (member invites
/// a user) and join requests (user asks, an admin decides).
pub struct GroupRepository<'a> {
    db: &'a Database,
}

impl<'a> GroupRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The creator joins as admin.
    pub fn create(&self, creator: Uuid, title: &str, description: &str) -> Result<GroupRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO groups (id, creator_id, title, description) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), creator.to_string(), title, description],
            )?;
            insert_member(&tx, id, creator, MemberRole::Admin)?;
            tx.commit()?;

            query_group(conn, id)
        })
    }

    pub fn get(&self, id: Uuid) -> Result<GroupRow> {
        self.db.with_conn(|conn| query_group(conn, id))
    }

    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<GroupRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{GROUP_SELECT} ORDER BY g.created_at DESC, g.rowid DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(params![page(limit), offset], GroupRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Groups `user` belongs to.
    pub fn list_for_user(&self, user: Uuid) -> Result<Vec<GroupRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{GROUP_SELECT}
                 JOIN group_members gm ON gm.group_id = g.id
                 WHERE gm.user_id = ?1
                 ORDER BY gm.joined_at DESC"
            ))?;
            let rows = stmt
                .query_map([user.to_string()], GroupRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute("DELETE FROM groups WHERE id = ?1", [id.to_string()])?;
            affected(rows, "group")
        })
    }

    // -- Members --

    pub fn is_member(&self, group: Uuid, user: Uuid) -> Result<bool> {
        Ok(self.member_role(group, user)?.is_some())
    }

    pub fn member_role(&self, group: Uuid, user: Uuid) -> Result<Option<MemberRole>> {
        self.db.with_conn(|conn| query_role(conn, group, user))
    }

    pub fn list_members(&self, group: Uuid) -> Result<Vec<MemberRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT gm.role, gm.joined_at, {BRIEF_COLUMNS}
                 FROM group_members gm
                 JOIN users u ON u.id = gm.user_id
                 WHERE gm.group_id = ?1
                 ORDER BY gm.joined_at ASC, gm.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([group.to_string()], |row| {
                    Ok(MemberRow {
                        role: row.parsed(0)?,
                        joined_at: row.timestamp(1)?,
                        user: UserBrief::from_row(row, 2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn member_ids(&self, group: Uuid) -> Result<Vec<Uuid>> {
        self.ids_where(group, "1 = 1")
    }

    pub fn admin_ids(&self, group: Uuid) -> Result<Vec<Uuid>> {
        self.ids_where(group, "role = 'admin'")
    }

    pub fn add_member(&self, group: Uuid, user: Uuid, role: MemberRole) -> Result<()> {
        self.db.with_conn_mut(|conn| insert_member(conn, group, user, role))
    }

    pub fn remove_member(&self, group: Uuid, user: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group.to_string(), user.to_string()],
            )?;
            affected(rows, "member")
        })
    }

    // -- Invitations --

    pub fn invite(&self, group: Uuid, inviter: Uuid, invitee: Uuid) -> Result<InvitationRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            if query_role(conn, group, invitee)?.is_some() {
                return Err(DbError::AlreadyExists("member"));
            }

            conn.execute(
                "INSERT INTO group_invitations (id, group_id, inviter_id, invitee_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    group.to_string(),
                    inviter.to_string(),
                    invitee.to_string()
                ],
            )
            .unique("invitation")?;

            query_invitation(conn, id)
        })
    }

    pub fn get_invitation(&self, id: Uuid) -> Result<InvitationRow> {
        self.db.with_conn(|conn| query_invitation(conn, id))
    }

    /// Only the invitee may answer, and only while the invitation is pending.
    /// Accepting adds the membership and settles any pending join request for
    /// the same pair in one transaction.
    pub fn respond_invitation(
        &self,
        id: Uuid,
        invitee: Uuid,
        accept: bool,
    ) -> Result<InvitationRow> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let invitation = query_invitation(&tx, id)?;
            if invitation.invitee_id != invitee {
                return Err(DbError::NotFound("invitation"));
            }
            ensure_pending(invitation.status, "invitation")?;

            let status = if accept {
                RequestStatus::Accepted
            } else {
                RequestStatus::Rejected
            };
            tx.execute(
                "UPDATE group_invitations SET status = ?2 WHERE id = ?1",
                params![id.to_string(), status.as_str()],
            )?;

            if accept {
                join_group(&tx, invitation.group_id, invitee)?;
            }

            tx.commit()?;
            debug!("Invitation {} {}", id, status);
            query_invitation(conn, id)
        })
    }

    pub fn list_pending_invitations(&self, user: Uuid) -> Result<Vec<InvitationRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{INVITATION_SELECT}
                 WHERE i.invitee_id = ?1 AND i.status = 'pending'
                 ORDER BY i.created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user.to_string()], InvitationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Join requests --

    pub fn request_join(&self, group: Uuid, user: Uuid) -> Result<JoinRequestRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            if query_role(conn, group, user)?.is_some() {
                return Err(DbError::AlreadyExists("member"));
            }

            conn.execute(
                "INSERT INTO group_join_requests (id, group_id, user_id) VALUES (?1, ?2, ?3)",
                params![id.to_string(), group.to_string(), user.to_string()],
            )
            .unique("join request")?;

            query_join_request(conn, id)
        })
    }

    pub fn get_join_request(&self, id: Uuid) -> Result<JoinRequestRow> {
        self.db.with_conn(|conn| query_join_request(conn, id))
    }

    /// Callers check that the responder is a group admin.
    pub fn respond_join_request(&self, id: Uuid, accept: bool) -> Result<JoinRequestRow> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let request = query_join_request(&tx, id)?;
            ensure_pending(request.status, "join request")?;

            let status = if accept {
                RequestStatus::Accepted
            } else {
                RequestStatus::Rejected
            };
            tx.execute(
                "UPDATE group_join_requests SET status = ?2 WHERE id = ?1",
                params![id.to_string(), status.as_str()],
            )?;

            if accept {
                join_group(&tx, request.group_id, request.user.id)?;
            }

            tx.commit()?;
            debug!("Join request {} {}", id, status);
            query_join_request(conn, id)
        })
    }

    pub fn list_pending_join_requests(&self, group: Uuid) -> Result<Vec<JoinRequestRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE r.group_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at ASC",
                join_request_select()
            ))?;
            let rows = stmt
                .query_map([group.to_string()], JoinRequestRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn ids_where(&self, group: Uuid, filter: &str) -> Result<Vec<Uuid>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT user_id FROM group_members WHERE group_id = ?1 AND {filter}"
            ))?;
            let rows = stmt
                .query_map([group.to_string()], |row| row.parsed(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn ensure_pending(status: RequestStatus, entity: &str) -> Result<()> {
    if status == RequestStatus::Pending {
        Ok(())
    } else {
        Err(DbError::InvalidState(format!("{entity} is already {status}")))
    }
}

/// Adds the membership and closes whichever other pending path into the
/// group the user had.
fn join_group(conn: &Connection, group: Uuid, user: Uuid) -> Result<()> {
    if query_role(conn, group, user)?.is_none() {
        insert_member(conn, group, user, MemberRole::Member)?;
    }

    conn.execute(
        "UPDATE group_invitations SET status = 'accepted'
         WHERE group_id = ?1 AND invitee_id = ?2 AND status = 'pending'",
        params![group.to_string(), user.to_string()],
    )?;
    conn.execute(
        "UPDATE group_join_requests SET status = 'accepted'
         WHERE group_id = ?1 AND user_id = ?2 AND status = 'pending'",
        params![group.to_string(), user.to_string()],
    )?;
    Ok(())
}

fn insert_member(conn: &Connection, group: Uuid, user: Uuid, role: MemberRole) -> Result<()> {
    conn.execute(
        "INSERT INTO group_members (group_id, user_id, role) VALUES (?1, ?2, ?3)",
        params![group.to_string(), user.to_string(), role.as_str()],
    )
    .unique("member")?;
    Ok(())
}

pub(crate) fn query_role(conn: &Connection, group: Uuid, user: Uuid) -> Result<Option<MemberRole>> {
    conn.query_row(
        "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group.to_string(), user.to_string()],
        |row| row.parsed(0),
    )
    .optional()
}

fn query_group(conn: &Connection, id: Uuid) -> Result<GroupRow> {
    conn.query_row(
        &format!("{GROUP_SELECT} WHERE g.id = ?1"),
        [id.to_string()],
        GroupRow::from_row,
    )
    .found("group")
}

fn query_invitation(conn: &Connection, id: Uuid) -> Result<InvitationRow> {
    conn.query_row(
        &format!("{INVITATION_SELECT} WHERE i.id = ?1"),
        [id.to_string()],
        InvitationRow::from_row,
    )
    .found("invitation")
}

fn query_join_request(conn: &Connection, id: Uuid) -> Result<JoinRequestRow> {
    conn.query_row(
        &format!("{} WHERE r.id = ?1", join_request_select()),
        [id.to_string()],
        JoinRequestRow::from_row,
    )
    .found("join request")
}
