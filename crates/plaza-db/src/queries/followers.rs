use rusqlite::{Connection, params};
use uuid::Uuid;

use plaza_types::models::FollowStatus;

use crate::error::{QueryExt, affected};
use crate::models::{BRIEF_COLUMNS, RowExt, UserBrief};
use crate::{Database, DbError, Result};

/// Directed follow edges. A follow towards a private profile starts out
/// `pending` until the target accepts it.
pub struct FollowerRepository<'a> {
    db: &'a Database,
}

impl<'a> FollowerRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn follow(
        &self,
        follower: Uuid,
        target: Uuid,
        target_is_private: bool,
    ) -> Result<FollowStatus> {
        if follower == target {
            return Err(DbError::InvalidInput("users cannot follow themselves".into()));
        }

        let status = if target_is_private {
            FollowStatus::Pending
        } else {
            FollowStatus::Accepted
        };

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO followers (follower_id, following_id, status) VALUES (?1, ?2, ?3)",
                params![follower.to_string(), target.to_string(), status.as_str()],
            )
            .unique("follow")?;
            Ok(status)
        })
    }

    /// Removes the edge whatever its status, so it also cancels a request.
    pub fn unfollow(&self, follower: Uuid, target: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND following_id = ?2",
                params![follower.to_string(), target.to_string()],
            )?;
            affected(rows, "follow")
        })
    }

    /// Accepts a pending request from `follower` to `target`.
    pub fn accept(&self, follower: Uuid, target: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "UPDATE followers SET status = 'accepted'
                 WHERE follower_id = ?1 AND following_id = ?2 AND status = 'pending'",
                params![follower.to_string(), target.to_string()],
            )?;
            affected(rows, "follow request")
        })
    }

    /// Declines a pending request by deleting it.
    pub fn decline(&self, follower: Uuid, target: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM followers
                 WHERE follower_id = ?1 AND following_id = ?2 AND status = 'pending'",
                params![follower.to_string(), target.to_string()],
            )?;
            affected(rows, "follow request")
        })
    }

    pub fn status(&self, follower: Uuid, target: Uuid) -> Result<Option<FollowStatus>> {
        self.db.with_conn(|conn| query_status(conn, follower, target))
    }

    pub fn is_following(&self, follower: Uuid, target: Uuid) -> Result<bool> {
        Ok(self.status(follower, target)? == Some(FollowStatus::Accepted))
    }

    /// Accepted followers of `user`.
    pub fn list_followers(&self, user: Uuid) -> Result<Vec<UserBrief>> {
        self.list_edges(
            "JOIN followers f ON f.follower_id = u.id
             WHERE f.following_id = ?1 AND f.status = 'accepted'",
            user,
        )
    }

    /// Users `user` follows with an accepted edge.
    pub fn list_following(&self, user: Uuid) -> Result<Vec<UserBrief>> {
        self.list_edges(
            "JOIN followers f ON f.following_id = u.id
             WHERE f.follower_id = ?1 AND f.status = 'accepted'",
            user,
        )
    }

    /// Users waiting for `user` to accept their follow request.
    pub fn list_pending_requests(&self, user: Uuid) -> Result<Vec<UserBrief>> {
        self.list_edges(
            "JOIN followers f ON f.follower_id = u.id
             WHERE f.following_id = ?1 AND f.status = 'pending'",
            user,
        )
    }

    pub fn count_followers(&self, user: Uuid) -> Result<i64> {
        self.count("following_id", user)
    }

    pub fn count_following(&self, user: Uuid) -> Result<i64> {
        self.count("follower_id", user)
    }

    /// Full profiles are visible to their owner, to everyone when public, and
    /// to accepted followers when private.
    pub fn can_view_profile(&self, viewer: Uuid, user: Uuid) -> Result<bool> {
        if viewer == user {
            return Ok(true);
        }

        self.db.with_conn(|conn| {
            let visible: bool = conn
                .query_row(
                    "SELECT u.is_private = 0 OR EXISTS (
                         SELECT 1 FROM followers f
                         WHERE f.follower_id = ?1 AND f.following_id = u.id
                           AND f.status = 'accepted')
                     FROM users u WHERE u.id = ?2",
                    params![viewer.to_string(), user.to_string()],
                    |row| row.get(0),
                )
                .found("user")?;
            Ok(visible)
        })
    }

    fn list_edges(&self, join_and_filter: &str, user: Uuid) -> Result<Vec<UserBrief>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRIEF_COLUMNS} FROM users u {join_and_filter}
                 ORDER BY f.created_at DESC"
            ))?;

            let rows = stmt
                .query_map([user.to_string()], |row| UserBrief::from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn count(&self, column: &str, user: Uuid) -> Result<i64> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM followers WHERE {column} = ?1 AND status = 'accepted'"
            );
            Ok(conn.query_row(
                &sql,
                [user.to_string()],
                |row| row.get(0),
            )?)
        })
    }
}

pub(crate) fn query_status(
    conn: &Connection,
    follower: Uuid,
    target: Uuid,
) -> Result<Option<FollowStatus>> {
    conn.query_row(
        "SELECT status FROM followers WHERE follower_id = ?1 AND following_id = ?2",
        params![follower.to_string(), target.to_string()],
        |row| row.parsed(0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, private_user, user};

    #[test]
    fn public_target_is_accepted_immediately() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        assert_eq!(db.followers().follow(a.id, b.id, false).unwrap(), FollowStatus::Accepted);
        assert!(db.followers().is_following(a.id, b.id).unwrap());
        assert!(!db.followers().is_following(b.id, a.id).unwrap());
        assert_eq!(db.followers().count_followers(b.id).unwrap(), 1);
        assert_eq!(db.followers().count_following(a.id).unwrap(), 1);
    }

    #[test]
    fn private_target_goes_through_request() {
        let db = db();
        let a = user(&db, "a");
        let b = private_user(&db, "b");

        assert_eq!(db.followers().follow(a.id, b.id, true).unwrap(), FollowStatus::Pending);
        assert_eq!(db.followers().list_pending_requests(b.id).unwrap().len(), 1);
        assert!(db.followers().list_followers(b.id).unwrap().is_empty());
        assert!(!db.followers().can_view_profile(a.id, b.id).unwrap());

        db.followers().accept(a.id, b.id).unwrap();
        assert_eq!(db.followers().status(a.id, b.id).unwrap(), Some(FollowStatus::Accepted));
        assert!(db.followers().can_view_profile(a.id, b.id).unwrap());

        // Already accepted, nothing pending any more
        assert!(matches!(
            db.followers().accept(a.id, b.id),
            Err(DbError::NotFound("follow request"))
        ));
    }

    #[test]
    fn decline_removes_request() {
        let db = db();
        let a = user(&db, "a");
        let b = private_user(&db, "b");

        db.followers().follow(a.id, b.id, true).unwrap();
        db.followers().decline(a.id, b.id).unwrap();
        assert_eq!(db.followers().status(a.id, b.id).unwrap(), None);
    }

    #[test]
    fn duplicate_and_self_follow_are_rejected() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        db.followers().follow(a.id, b.id, false).unwrap();
        assert!(matches!(
            db.followers().follow(a.id, b.id, false),
            Err(DbError::AlreadyExists("follow"))
        ));
        assert!(matches!(
            db.followers().follow(a.id, a.id, false),
            Err(DbError::InvalidInput(_))
        ));
    }

    #[test]
    fn unfollow_then_unfollow_again_is_not_found() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        db.followers().follow(a.id, b.id, false).unwrap();
        db.followers().unfollow(a.id, b.id).unwrap();
        assert!(db.followers().list_following(a.id).unwrap().is_empty());
        assert!(matches!(db.followers().unfollow(a.id, b.id), Err(DbError::NotFound("follow"))));
    }
}
