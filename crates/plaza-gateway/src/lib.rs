pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod notifier;

use std::sync::Arc;

use plaza_db::{Database, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run synchronous database work off the async runtime.
pub async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, GatewayError>
where
    F: FnOnce(&Database) -> Result<T, GatewayError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}
