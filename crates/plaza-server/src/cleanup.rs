use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use plaza_db::Database;

/// Background task that deletes expired sessions on an interval.
pub async fn run_session_sweep(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.sessions().clean_expired()).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Session sweep: removed {} expired sessions", count);
                }
            }
            Ok(Err(e)) => warn!("Session sweep error: {}", e),
            Err(e) => warn!("Session sweep task failed: {}", e),
        }
    }
}
