use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("referenced row does not exist")]
    InvalidReference,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

/// Constraint failures are classified by SQLite's extended result code.
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let constraint = match &err {
            rusqlite::Error::QueryReturnedNoRows => return Self::NotFound("row"),
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                Some(e.extended_code)
            }
            _ => None,
        };

        match constraint {
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                Self::AlreadyExists("row")
            }
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Self::InvalidReference,
            _ => Self::Sqlite(err),
        }
    }
}

/// Names the entity behind a missing row or a uniqueness conflict.
pub(crate) trait QueryExt<T> {
    /// No rows becomes `Ok(None)`.
    fn optional(self) -> Result<Option<T>>;

    /// No rows becomes `NotFound(entity)`.
    fn found(self, entity: &'static str) -> Result<T>;

    /// A unique or primary key violation becomes `AlreadyExists(entity)`.
    fn unique(self, entity: &'static str) -> Result<T>;
}

impl<T> QueryExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn found(self, entity: &'static str) -> Result<T> {
        self.map_err(|e| match DbError::from(e) {
            DbError::NotFound(_) => DbError::NotFound(entity),
            other => other,
        })
    }

    fn unique(self, entity: &'static str) -> Result<T> {
        self.map_err(|e| match DbError::from(e) {
            DbError::AlreadyExists(_) => DbError::AlreadyExists(entity),
            other => other,
        })
    }
}

/// Maps a zero-row UPDATE/DELETE to `NotFound(entity)`.
pub(crate) fn affected(rows: usize, entity: &'static str) -> Result<()> {
    if rows == 0 {
        Err(DbError::NotFound(entity))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn.execute_batch(
            "CREATE TABLE parent (id TEXT PRIMARY KEY, name TEXT UNIQUE);
             CREATE TABLE child (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT NOT NULL REFERENCES parent(id)
             );
             INSERT INTO parent (id, name) VALUES ('p1', 'first');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn unique_violation_is_classified_by_code() {
        let conn = conn();
        let err = conn
            .execute("INSERT INTO parent (id, name) VALUES ('p2', 'first')", [])
            .unique("parent")
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists("parent")));
    }

    #[test]
    fn primary_key_violation_is_already_exists() {
        let conn = conn();
        let err: DbError = conn
            .execute("INSERT INTO parent (id, name) VALUES ('p1', 'other')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::AlreadyExists(_)));
    }

    #[test]
    fn foreign_key_violation_is_invalid_reference() {
        let conn = conn();
        let err: DbError = conn
            .execute("INSERT INTO child (id, parent_id) VALUES ('c1', 'missing')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::InvalidReference));
    }

    #[test]
    fn no_rows_maps_to_named_entity() {
        let conn = conn();
        let res: Result<String> = conn
            .query_row("SELECT name FROM parent WHERE id = 'nope'", [], |r| r.get(0))
            .found("parent");
        assert!(matches!(res, Err(DbError::NotFound("parent"))));

        let missing: Option<String> = conn
            .query_row("SELECT name FROM parent WHERE id = 'nope'", [], |r| r.get(0))
            .optional()
            .unwrap();
        assert!(missing.is_none());
    }
}
