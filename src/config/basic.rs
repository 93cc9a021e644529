use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Basic (core) configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// HTTP server listen address (e.g., "0.0.0.0", "127.0.0.1").
    /// TOML: `basic.listen_addr`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// TOML: `basic.listen_port`. Default: `8188`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Database URL for SQLite (principals, roles, refresh tokens).
    /// TOML: `basic.database_url`. Default: `sqlite://data.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Log level for tracing subscriber initialization.
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Path to a PKCS8 RSA private key PEM used to sign access/refresh tokens.
    /// When unset, an in-process keypair is generated at startup (fine for a single-node
    /// deployment or tests, not for a fleet that needs to share a signing key).
    /// TOML: `basic.signing_key_path`.
    #[serde(default)]
    pub signing_key_path: Option<String>,

    /// Access token time-to-live, in seconds.
    /// TOML: `basic.access_ttl_seconds`. Default: `900` (15 minutes).
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: i64,

    /// Refresh token time-to-live, in seconds.
    /// TOML: `basic.refresh_ttl_seconds`. Default: `2592000` (30 days).
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: i64,

    /// Deadline, in milliseconds, a job may wait in `queued` before failing `no_capacity`.
    /// TOML: `basic.admission_deadline_ms`. Default: `30000`.
    #[serde(default = "default_admission_deadline_ms")]
    pub admission_deadline_ms: u64,

    /// Bounded capacity of the scheduler's job queue.
    /// TOML: `basic.queue_capacity`. Default: `1024`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Default time-to-live for a completed/failed job record, in seconds.
    /// TOML: `basic.job_ttl_seconds`. Default: `3600`.
    #[serde(default = "default_job_ttl_seconds")]
    pub job_ttl_seconds: u64,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            database_url: default_database_url(),
            loglevel: default_loglevel(),
            signing_key_path: None,
            access_ttl_seconds: default_access_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            admission_deadline_ms: default_admission_deadline_ms(),
            queue_capacity: default_queue_capacity(),
            job_ttl_seconds: default_job_ttl_seconds(),
        }
    }
}

fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

fn default_listen_port() -> u16 {
    8188
}

fn default_database_url() -> String {
    "sqlite://data.db".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    30 * 24 * 60 * 60
}

fn default_admission_deadline_ms() -> u64 {
    30_000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_job_ttl_seconds() -> u64 {
    3600
}
