//! Application configuration. Paths, identity tokens, scheduling and send limits.

use crate::usecases::DispatchPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default seconds between scheduler polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default lifetime of a cached chat listing.
pub const DEFAULT_DIRECTORY_TTL_SECS: u64 = 300;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Base directory for snapshot, chat catalog and outbox. Read from TG_BROADCAST_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Broadcast snapshot file (default `{data_dir}/broadcasts.json`).
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Chat catalog JSON (default `{data_dir}/chats.json`).
    #[serde(default)]
    pub chats_path: Option<String>,

    /// Outbox directory for the local transport (default `{data_dir}/outbox`).
    #[serde(default)]
    pub outbox_dir: Option<String>,

    /// `outbox` (default) or `scripted` (dry run, delivers everything in memory).
    #[serde(default)]
    pub transport: Option<String>,

    /// Comma-separated chat ids the outbox refuses permanently.
    #[serde(default)]
    pub blocked_chats: Option<String>,

    /// Comma-separated identity tokens accepted for commands. Read from TG_BROADCAST_AUTH_TOKENS.
    #[serde(default)]
    pub auth_tokens: Option<String>,

    /// Identity the engine uses when reading the chat directory.
    #[serde(default)]
    pub service_token: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling & Dispatch
    // ─────────────────────────────────────────────────────────────────────────
    /// Seconds between scheduler polls (default 30). Read from TG_BROADCAST_POLL_INTERVAL_SECS.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Chat directory cache TTL in seconds (default 300).
    #[serde(default)]
    pub directory_ttl_secs: Option<u64>,

    /// Per-dispatch concurrent sends (default 5).
    #[serde(default)]
    pub max_concurrent_sends: Option<usize>,

    /// Attempts per chat including the first (default 3).
    #[serde(default)]
    pub max_send_attempts: Option<u32>,

    /// Deadline of one send attempt in ms (default 10000).
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,

    /// Backoff before the second attempt in ms, doubled per attempt (default 500).
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,

    /// Cap on any wait between attempts in ms (default 30000).
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("TG_BROADCAST_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        // Environment wins over the file.
        c = c.add_source(config::Environment::with_prefix("TG_BROADCAST"));
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
    }

    pub fn snapshot_path_or_default(&self) -> PathBuf {
        self.snapshot_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("broadcasts.json"))
    }

    pub fn chats_path_or_default(&self) -> PathBuf {
        self.chats_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("chats.json"))
    }

    pub fn outbox_dir_or_default(&self) -> PathBuf {
        self.outbox_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("outbox"))
    }

    /// True when the in-memory scripted transport was requested.
    pub fn is_scripted_transport(&self) -> bool {
        self.transport
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("scripted"))
    }

    /// Parsed blocked chat ids; entries that are not integers are skipped.
    pub fn blocked_chats(&self) -> Vec<i64> {
        split_list(self.blocked_chats.as_deref())
            .filter_map(|s| s.parse().ok())
            .collect()
    }

    pub fn auth_tokens(&self) -> Vec<String> {
        split_list(self.auth_tokens.as_deref())
            .map(String::from)
            .collect()
    }

    pub fn service_token_or_default(&self) -> String {
        self.service_token
            .clone()
            .unwrap_or_else(|| "service".to_string())
    }

    /// Poll interval; never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }

    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(
            self.directory_ttl_secs
                .unwrap_or(DEFAULT_DIRECTORY_TTL_SECS),
        )
    }

    /// Dispatch limits with defaults filled in.
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        let d = DispatchPolicy::default();
        DispatchPolicy {
            max_concurrent_sends: self.max_concurrent_sends.unwrap_or(d.max_concurrent_sends),
            max_attempts: self.max_send_attempts.unwrap_or(d.max_attempts),
            send_timeout: self
                .send_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.send_timeout),
            backoff_base: self
                .backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(d.backoff_base),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(d.max_backoff),
        }
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
