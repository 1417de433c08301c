use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use crate::error::{QueryExt, affected};
use crate::models::{BRIEF_COLUMNS, CommentRow, NewComment, RowExt, UserBrief};
use crate::queries::page;
use crate::{Database, Result};

impl CommentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.parsed(0)?,
            post_id: row.parsed(1)?,
            content: row.get(2)?,
            image: row.get(3)?,
            created_at: row.timestamp(4)?,
            author: UserBrief::from_row(row, 5)?,
        })
    }
}

fn comment_select() -> String {
    format!(
        "SELECT c.id, c.post_id, c.content, c.image, c.created_at, {BRIEF_COLUMNS}
         FROM comments c
         JOIN users u ON u.id = c.user_id"
    )
}

pub struct CommentRepository<'a> {
    db: &'a Database,
}

impl<'a> CommentRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: NewComment) -> Result<CommentRow> {
        let id = Uuid::new_v4();

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, content, image)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    new.post_id.to_string(),
                    new.author_id.to_string(),
                    new.content,
                    new.image,
                ],
            )?;
            query_comment(conn, id)
        })
    }

    pub fn get(&self, id: Uuid) -> Result<CommentRow> {
        self.db.with_conn(|conn| query_comment(conn, id))
    }

    /// Oldest first, the order a thread is read in.
    pub fn list_by_post(&self, post_id: Uuid, limit: u32, offset: u32) -> Result<Vec<CommentRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC
                 LIMIT ?2 OFFSET ?3",
                comment_select()
            ))?;

            let rows = stmt
                .query_map(
                    params![post_id.to_string(), page(limit), offset],
                    CommentRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_by_post(&self, post_id: Uuid) -> Result<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                [post_id.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute("DELETE FROM comments WHERE id = ?1", [id.to_string()])?;
            affected(rows, "comment")
        })
    }
}

fn query_comment(conn: &Connection, id: Uuid) -> Result<CommentRow> {
    conn.query_row(
        &format!("{} WHERE c.id = ?1", comment_select()),
        [id.to_string()],
        CommentRow::from_row,
    )
    .found("comment")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::models::NewPost;
    use crate::queries::test_support::{db, user};
    use plaza_types::models::PostPrivacy;

    fn setup(db: &Database) -> (Uuid, Uuid) {
        let author = user(db, "author");
        let post = db
            .posts()
            .create(NewPost {
                author_id: author.id,
                group_id: None,
                content: "hello".to_string(),
                image: None,
                privacy: PostPrivacy::Public,
                allowed_user_ids: vec![],
            })
            .unwrap();
        (author.id, post.id)
    }

    fn comment(db: &Database, post_id: Uuid, author_id: Uuid, content: &str) -> CommentRow {
        db.comments()
            .create(NewComment {
                post_id,
                author_id,
                content: content.to_string(),
                image: None,
            })
            .unwrap()
    }

    #[test]
    fn comments_are_listed_oldest_first() {
        let db = db();
        let (author, post) = setup(&db);

        comment(&db, post, author, "first");
        comment(&db, post, author, "second");

        let listed = db.comments().list_by_post(post, 50, 0).unwrap();
        let contents: Vec<_> = listed.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert_eq!(db.comments().count_by_post(post).unwrap(), 2);
        assert_eq!(db.posts().get(post).unwrap().comment_count, 2);
    }

    #[test]
    fn comment_on_missing_post_is_invalid_reference() {
        let db = db();
        let (author, _) = setup(&db);

        let err = db
            .comments()
            .create(NewComment {
                post_id: Uuid::new_v4(),
                author_id: author,
                content: "orphan".to_string(),
                image: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference));
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let db = db();
        let (author, post) = setup(&db);
        let created = comment(&db, post, author, "bye");

        assert_eq!(db.comments().get(created.id).unwrap().author.id, author);
        db.comments().delete(created.id).unwrap();
        assert!(matches!(db.comments().get(created.id), Err(DbError::NotFound("comment"))));
    }

    #[test]
    fn deleting_post_removes_comments() {
        let db = db();
        let (author, post) = setup(&db);
        let created = comment(&db, post, author, "gone soon");

        db.posts().delete(post).unwrap();
        assert!(db.comments().get(created.id).is_err());
    }
}
