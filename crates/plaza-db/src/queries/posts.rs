use rusqlite::{Connection, Row, named_params, params};
use uuid::Uuid;

use plaza_types::models::PostPrivacy;

use crate::error::{QueryExt, affected};
use crate::models::{BRIEF_COLUMNS, NewPost, PostRow, RowExt, UserBrief};
use crate::queries::page;
use crate::{Database, Result};

/// Columns for `PostRow::from_row`; expects `posts p JOIN users u`.
fn post_select() -> String {
    format!(
        "SELECT p.id, p.group_id, p.content, p.image, p.privacy, p.created_at,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                {BRIEF_COLUMNS}
         FROM posts p
         JOIN users u ON u.id = p.user_id"
    )
}

/// Visibility of an ungrouped post to `:viewer`: public, own, followed and
/// almost private, or allow-listed and private.
const UNGROUPED_VISIBLE: &str = "
    p.group_id IS NULL AND (
        p.privacy = 'public'
        OR p.user_id = :viewer
        OR (p.privacy = 'almost_private' AND EXISTS (
                SELECT 1 FROM followers f
                WHERE f.follower_id = :viewer
                  AND f.following_id = p.user_id
                  AND f.status = 'accepted'))
        OR (p.privacy = 'private' AND EXISTS (
                SELECT 1 FROM post_allowed_users a
                WHERE a.post_id = p.id AND a.user_id = :viewer))
    )";

/// Group posts are visible to group members only.
const GROUP_MEMBER_VISIBLE: &str = "
    p.group_id IS NOT NULL AND EXISTS (
        SELECT 1 FROM group_members gm
        WHERE gm.group_id = p.group_id AND gm.user_id = :viewer)";

const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.rowid DESC LIMIT :limit OFFSET :offset";

impl PostRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            group_id: row.parsed_opt(1)?,
            content: row.get(2)?,
            image: row.get(3)?,
            privacy: row.parsed(4)?,
            created_at: row.timestamp(5)?,
            comment_count: row.get(6)?,
            author: UserBrief::from_row(row, 7)?,
        })
    }
}

pub struct PostRepository<'a> {
    db: &'a Database,
}

impl<'a> PostRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The allow-list is only written for private, ungrouped posts. Group
    /// posts are stored as public; membership decides who sees them.
    pub fn create(&self, new: NewPost) -> Result<PostRow> {
        let id = Uuid::new_v4();
        let privacy = if new.group_id.is_some() {
            PostPrivacy::Public
        } else {
            new.privacy
        };

        self.db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO posts (id, user_id, group_id, content, image, privacy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    new.author_id.to_string(),
                    new.group_id.map(|g| g.to_string()),
                    new.content,
                    new.image,
                    privacy.as_str(),
                ],
            )?;

            if privacy == PostPrivacy::Private {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO post_allowed_users (post_id, user_id) VALUES (?1, ?2)",
                )?;
                for user_id in &new.allowed_user_ids {
                    stmt.execute(params![id.to_string(), user_id.to_string()])?;
                }
            }

            tx.commit()?;
            query_post(conn, id)
        })
    }

    /// Unfiltered lookup, for ownership checks.
    pub fn get(&self, id: Uuid) -> Result<PostRow> {
        self.db.with_conn(|conn| query_post(conn, id))
    }

    /// A post the viewer may not see is reported as missing.
    pub fn get_visible(&self, id: Uuid, viewer: Uuid) -> Result<PostRow> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "{} WHERE p.id = :id AND (({UNGROUPED_VISIBLE}) OR ({GROUP_MEMBER_VISIBLE}))",
                    post_select()
                ),
                named_params! { ":id": id.to_string(), ":viewer": viewer.to_string() },
                PostRow::from_row,
            )
            .found("post")
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute("DELETE FROM posts WHERE id = ?1", [id.to_string()])?;
            affected(rows, "post")
        })
    }

    pub fn allowed_users(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM post_allowed_users WHERE post_id = ?1")?;
            let rows = stmt
                .query_map([post_id.to_string()], |row| row.parsed(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Main feed: every ungrouped post the viewer can see.
    pub fn list(&self, viewer: Uuid, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.db.with_conn(|conn| {
            let sql = format!("{} WHERE {UNGROUPED_VISIBLE} {NEWEST_FIRST}", post_select());
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt
                .query_map(
                    named_params! {
                        ":viewer": viewer.to_string(),
                        ":limit": page(limit),
                        ":offset": offset,
                    },
                    PostRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Posts by `author` that the viewer can see.
    pub fn list_by_user(
        &self,
        author: Uuid,
        viewer: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PostRow>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "{} WHERE p.user_id = :author AND {UNGROUPED_VISIBLE} {NEWEST_FIRST}",
                post_select()
            );
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt
                .query_map(
                    named_params! {
                        ":author": author.to_string(),
                        ":viewer": viewer.to_string(),
                        ":limit": page(limit),
                        ":offset": offset,
                    },
                    PostRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Visible posts by users the viewer follows with an accepted edge.
    pub fn list_followed_by_user(
        &self,
        viewer: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PostRow>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "{} WHERE EXISTS (
                        SELECT 1 FROM followers ff
                        WHERE ff.follower_id = :viewer
                          AND ff.following_id = p.user_id
                          AND ff.status = 'accepted')
                   AND {UNGROUPED_VISIBLE} {NEWEST_FIRST}",
                post_select()
            );
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt
                .query_map(
                    named_params! {
                        ":viewer": viewer.to_string(),
                        ":limit": page(limit),
                        ":offset": offset,
                    },
                    PostRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Posts of a group. Callers check membership.
    pub fn list_by_group(&self, group_id: Uuid, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.db.with_conn(|conn| {
            let sql = format!("{} WHERE p.group_id = :group {NEWEST_FIRST}", post_select());
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt
                .query_map(
                    named_params! {
                        ":group": group_id.to_string(),
                        ":limit": page(limit),
                        ":offset": offset,
                    },
                    PostRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_post(conn: &Connection, id: Uuid) -> Result<PostRow> {
    conn.query_row(
        &format!("{} WHERE p.id = ?1", post_select()),
        [id.to_string()],
        PostRow::from_row,
    )
    .found("post")
}
