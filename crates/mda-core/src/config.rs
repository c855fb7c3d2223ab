use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::probe::ProbeSettings;
use crate::retry::RetryPolicy;

/// Retry policy for opening a data stream on one host (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of open attempts per host (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_secs: 0.25,
            max_delay_secs: 5,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/mda/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdaConfig {
    /// Number of parallel transfer streams (the coordinator counts as one).
    pub workers: usize,
    /// Successful round-trips after which a host is considered measured.
    pub min_tries: u32,
    /// Hosts farther than this many hops are discarded.
    pub max_ttl: u8,
    /// Do not resend to a host whose probe is younger than this (ms).
    pub resend_threshold_ms: u64,
    /// Initial ICMP receive timeout (ms); tightened to half the best lag seen.
    pub recv_timeout_ms: u64,
    /// Lag samples at or below this (ms) do not tighten the receive timeout.
    pub min_lag_sample_ms: u64,
    /// Consecutive unanswered probes before a host is discarded.
    pub max_probe_retries: u32,
    /// First UDP destination port for probes; the sequence number is added to it.
    pub base_port: u16,
    /// Progress bar refresh cadence (ms).
    pub progress_interval_ms: u64,
    /// Mirror index URL template; `{filename}` is replaced with the URL-encoded name.
    #[serde(default)]
    pub mirror_index: Option<String>,
    /// Connect timeout for data streams and index queries (seconds).
    pub connect_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for MdaConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            min_tries: 10,
            max_ttl: 30,
            resend_threshold_ms: 3000,
            recv_timeout_ms: 50,
            min_lag_sample_ms: 10,
            max_probe_retries: 3,
            base_port: 32768 + 666,
            progress_interval_ms: 1000,
            mirror_index: None,
            connect_timeout_secs: 30,
            retry: None,
        }
    }
}

impl MdaConfig {
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            min_tries: self.min_tries.max(1),
            max_ttl: self.max_ttl.max(1),
            max_retries: self.max_probe_retries.max(1),
            resend_threshold: Duration::from_millis(self.resend_threshold_ms),
            recv_timeout: Duration::from_millis(self.recv_timeout_ms.max(1)),
            min_lag_sample: Duration::from_millis(self.min_lag_sample_ms),
            base_port: self.base_port,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(50))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mda")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdaConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdaConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MdaConfig = toml::from_str(&data)?;
    Ok(cfg)
}
