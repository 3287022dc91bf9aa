use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{KokoroError, Result};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_QUEUE_NAME: &str = "kokoro-reminders";
pub const DEFAULT_RESEND_URL: &str = "https://api.resend.com";

/// Top-level config (kokoro.toml + KOKORO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KokoroConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bearer secret for the fallback trigger. Unset means every call is rejected.
    pub cron_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth: AuthConfig::default(),
            cron_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Bearer token for the user-facing API. Unset means deny.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_queue_path")]
    pub path: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_completed_max_age")]
    pub completed_max_age_secs: u64,
    #[serde(default = "default_completed_max_count")]
    pub completed_max_count: u64,
    #[serde(default = "default_failed_max_age")]
    pub failed_max_age_secs: u64,
    #[serde(default = "default_failed_max_count")]
    pub failed_max_count: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            path: default_queue_path(),
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
            completed_max_age_secs: default_completed_max_age(),
            completed_max_count: default_completed_max_count(),
            failed_max_age_secs: default_failed_max_age(),
            failed_max_count: default_failed_max_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Activations allowed per rate window, across every worker sharing the queue.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_stall_interval")]
    pub stall_interval_secs: u64,
    #[serde(default = "default_max_stalled_count")]
    pub max_stalled_count: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            lock_ttl_secs: default_lock_ttl(),
            stall_interval_secs: default_stall_interval(),
            max_stalled_count: default_max_stalled_count(),
            poll_interval_ms: default_poll_interval_ms(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between in-process sweeps. 0 leaves sweeping to the HTTP trigger.
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierProvider {
    /// Writes the rendered message to the log instead of sending it.
    #[default]
    Log,
    Resend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub provider: NotifierProvider,
    pub api_key: Option<String>,
    pub from: Option<String>,
    #[serde(default = "default_resend_url")]
    pub base_url: String,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            provider: NotifierProvider::default(),
            api_key: None,
            from: None,
            base_url: default_resend_url(),
            timeout_secs: default_notifier_timeout(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    60_000
}
fn default_completed_max_age() -> u64 {
    24 * 3600
}
fn default_completed_max_count() -> u64 {
    1000
}
fn default_failed_max_age() -> u64 {
    7 * 24 * 3600
}
fn default_failed_max_count() -> u64 {
    10_000
}
fn default_concurrency() -> usize {
    5
}
fn default_rate_limit_max() -> u32 {
    10
}
fn default_rate_limit_window_ms() -> u64 {
    1000
}
fn default_lock_ttl() -> u64 {
    30
}
fn default_stall_interval() -> u64 {
    30
}
fn default_max_stalled_count() -> u32 {
    1
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_prune_interval() -> u64 {
    60
}
fn default_reconcile_interval() -> u64 {
    300
}
fn default_batch_size() -> usize {
    100
}
fn default_resend_url() -> String {
    DEFAULT_RESEND_URL.to_string()
}
fn default_notifier_timeout() -> u64 {
    30
}

fn kokoro_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kokoro", home)
}
fn default_db_path() -> String {
    format!("{}/kokoro.db", kokoro_home())
}
fn default_queue_path() -> String {
    format!("{}/queue.db", kokoro_home())
}

impl KokoroConfig {
    /// Load config from a TOML file with KOKORO_* env var overrides.
    ///
    /// The file is picked from, in order:
    ///   1. Explicit path argument
    ///   2. `KOKORO_CONFIG`
    ///   3. ~/.kokoro/kokoro.toml
    ///
    /// Nested keys are separated by a double underscore in env vars, e.g.
    /// `KOKORO_WORKER__CONCURRENCY=8`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("KOKORO_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| KokoroError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("KOKORO_").split("__"))
    }

    /// Reject values that would stall or wedge the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.worker.concurrency < 1 {
            return Err(KokoroError::Config(
                "worker.concurrency must be at least 1".into(),
            ));
        }
        if self.queue.attempts < 1 {
            return Err(KokoroError::Config("queue.attempts must be at least 1".into()));
        }
        if self.worker.rate_limit_max < 1 || self.worker.rate_limit_window_ms < 1 {
            return Err(KokoroError::Config(
                "worker.rate_limit_max and worker.rate_limit_window_ms must be at least 1".into(),
            ));
        }
        if self.reconcile.batch_size < 1 {
            return Err(KokoroError::Config(
                "reconcile.batch_size must be at least 1".into(),
            ));
        }
        if self.worker.lock_ttl_secs < 1 {
            return Err(KokoroError::Config(
                "worker.lock_ttl_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    format!("{}/kokoro.toml", kokoro_home())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = KokoroConfig::default();
        assert_eq!(cfg.gateway.port, 8787);
        assert_eq!(cfg.queue.name, "kokoro-reminders");
        assert_eq!(cfg.queue.attempts, 3);
        assert_eq!(cfg.queue.backoff_ms, 60_000);
        assert_eq!(cfg.worker.concurrency, 5);
        assert_eq!(cfg.worker.rate_limit_max, 10);
        assert_eq!(cfg.reconcile.batch_size, 100);
        assert_eq!(cfg.notifier.provider, NotifierProvider::Log);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gateway]
port = 9000
cron_secret = "s3cret"

[worker]
concurrency = 2

[notifier]
provider = "resend"
api_key = "re_test"
from = "Kokoro <noreply@example.com>"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cfg: KokoroConfig = Figment::new()
            .merge(Toml::file(&path))
            .extract()
            .unwrap();

        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.cron_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.worker.concurrency, 2);
        assert_eq!(cfg.worker.rate_limit_max, 10);
        assert_eq!(cfg.notifier.provider, NotifierProvider::Resend);
        assert_eq!(cfg.notifier.base_url, DEFAULT_RESEND_URL);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = KokoroConfig::default();
        cfg.worker.concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn validate_rejects_zero_attempts_and_batch() {
        let mut cfg = KokoroConfig::default();
        cfg.queue.attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = KokoroConfig::default();
        cfg.reconcile.batch_size = 0;
        assert!(cfg.validate().is_err());
    }
}
