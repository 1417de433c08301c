use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Server settings, read from `PLAZA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl_hours: i64,
    pub session_sweep_secs: u64,
    pub reader_pool: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            db_path: PathBuf::from(var("PLAZA_DB_PATH", "plaza.db")),
            host: var("PLAZA_HOST", "0.0.0.0"),
            port: var("PLAZA_PORT", "3000")
                .parse()
                .context("PLAZA_PORT must be a port number")?,
            session_ttl_hours: var("PLAZA_SESSION_TTL_HOURS", "168")
                .parse()
                .context("PLAZA_SESSION_TTL_HOURS must be a whole number of hours")?,
            session_sweep_secs: var("PLAZA_SESSION_SWEEP_SECS", "600")
                .parse()
                .context("PLAZA_SESSION_SWEEP_SECS must be a whole number of seconds")?,
            reader_pool: var("PLAZA_READER_POOL", "4")
                .parse()
                .context("PLAZA_READER_POOL must be a whole number")?,
        };

        anyhow::ensure!(config.session_ttl_hours > 0, "PLAZA_SESSION_TTL_HOURS must be positive");
        anyhow::ensure!(config.session_sweep_secs > 0, "PLAZA_SESSION_SWEEP_SECS must be positive");
        Ok(config)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
