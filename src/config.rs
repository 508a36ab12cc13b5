//! Command line and environment configuration
//!
//! Every flag has an environment twin; the environment wins over the built-in
//! default, an explicit flag wins over both. Durations accept either plain
//! seconds (`300`) or humantime syntax (`5m`, `300s`, `1h 30m`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::orchestrator::PersistenceSettings;
use crate::signing::Signer;
use crate::storage::RetryPolicy;

/// Metrics ingestion server
#[derive(Debug, Clone, Parser)]
#[command(name = "alertics-server", version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(short, long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// Snapshot flush interval, 0 writes on every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value = "300s", value_parser = parse_interval)]
    pub store_interval: Duration,

    /// Snapshot file location
    #[arg(short = 'f', long, env = "STORE_FILE", default_value = "/tmp/devops-metrics-db.json")]
    pub store_file: PathBuf,

    /// Replay the snapshot file on startup
    #[arg(
        short,
        long,
        env = "RESTORE",
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub restore: bool,

    /// HMAC key for sample integrity checks
    #[arg(short, long, env = "KEY")]
    pub key: Option<String>,

    /// Database connection string, selects the relational backend
    #[arg(short, long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Connection attempts before giving up at startup
    #[arg(long, env = "DATABASE_CONNECT_ATTEMPTS", default_value_t = 3)]
    pub connect_attempts: u32,

    /// Pause between two connection attempts
    #[arg(long, env = "DATABASE_CONNECT_DELAY", default_value = "5s", value_parser = parse_interval)]
    pub connect_delay: Duration,
}

/// Where the server keeps its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// In-memory store made durable through snapshot files
    Memory(PersistenceSettings),

    /// Relational backend, durable on every write
    Database { dsn: String, retry: RetryPolicy },
}

impl ServerConfig {
    /// Resolve the storage backend; a non-empty DSN selects the database
    pub fn storage_mode(&self) -> StorageMode {
        match self.database_dsn.as_deref().map(str::trim) {
            Some(dsn) if !dsn.is_empty() => StorageMode::Database {
                dsn: dsn.to_string(),
                retry: RetryPolicy {
                    max_attempts: self.connect_attempts,
                    delay: self.connect_delay,
                },
            },
            _ => StorageMode::Memory(PersistenceSettings {
                snapshot_path: self.store_file.clone(),
                interval: self.store_interval,
                restore: self.restore,
            }),
        }
    }

    pub fn signer(&self) -> Option<Signer> {
        signer_for(self.key.as_deref())
    }
}

/// Metrics reporting agent
#[derive(Debug, Clone, Parser)]
#[command(name = "alertics-agent", version)]
pub struct AgentConfig {
    /// Server address
    #[arg(short, long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// How often the collected samples are sent
    #[arg(short, long, env = "REPORT_INTERVAL", default_value = "10s", value_parser = parse_interval)]
    pub report_interval: Duration,

    /// How often system statistics are sampled
    #[arg(short, long, env = "POLL_INTERVAL", default_value = "2s", value_parser = parse_interval)]
    pub poll_interval: Duration,

    /// HMAC key used to sign every sample
    #[arg(short, long, env = "KEY")]
    pub key: Option<String>,
}

impl AgentConfig {
    /// Base URL of the server; a bare `host:port` gets `http://` prepended
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }

    pub fn signer(&self) -> Option<Signer> {
        signer_for(self.key.as_deref())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll interval must be greater than zero");
        }
        if self.report_interval.is_zero() {
            anyhow::bail!("report interval must be greater than zero");
        }
        Ok(())
    }
}

fn signer_for(key: Option<&str>) -> Option<Signer> {
    key.filter(|key| !key.is_empty()).map(Signer::new)
}

/// Plain seconds or a humantime duration
fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(raw).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}
