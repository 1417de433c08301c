pub mod convert;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

pub use error::{DbError, Result};
pub use queries::{
    comments::CommentRepository, events::GroupEventRepository, followers::FollowerRepository,
    groups::GroupRepository, messages::MessageRepository, notifications::NotificationRepository,
    posts::PostRepository, sessions::SessionRepository, users::UserRepository,
};

/// SQLite handle with a single writer and a round-robin pool of read-only
/// connections. An in-memory database has no readers; reads go to the writer.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path, reader_pool: usize) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(reader_pool);
        for _ in 0..reader_pool {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            reader_pool
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Run a read-only closure on a pooled reader connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            return self.with_conn_mut(f);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }

    /// Run a closure on the writer connection.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.writer.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self)
    }

    pub fn sessions(&self) -> SessionRepository<'_> {
        SessionRepository::new(self)
    }

    pub fn posts(&self) -> PostRepository<'_> {
        PostRepository::new(self)
    }

    pub fn comments(&self) -> CommentRepository<'_> {
        CommentRepository::new(self)
    }

    pub fn followers(&self) -> FollowerRepository<'_> {
        FollowerRepository::new(self)
    }

    pub fn groups(&self) -> GroupRepository<'_> {
        GroupRepository::new(self)
    }

    pub fn group_events(&self) -> GroupEventRepository<'_> {
        GroupEventRepository::new(self)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(self)
    }

    pub fn notifications(&self) -> NotificationRepository<'_> {
        NotificationRepository::new(self)
    }
}
