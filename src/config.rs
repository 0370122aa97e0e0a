//! TOML configuration for both services.
//!
//! A layered model: compiled-in defaults, overridden by a TOML file found via
//! the `CMDLEDGER_CONFIG` environment variable (or `--config`), falling back
//! to the standard system location. CLI flags override individual fields
//! after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CMDLEDGER_CONFIG";

/// Standard system location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/cmdledger/cmdledger.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration, in order:
    /// 1. `explicit` (the `--config` flag), which must load.
    /// 2. The path in `CMDLEDGER_CONFIG`.
    /// 3. [`SYSTEM_CONFIG_PATH`].
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CMDLEDGER_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        self.forward.validate()
    }
}

// ---------------------------------------------------------------------------
// Exec
// ---------------------------------------------------------------------------

/// Executor service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Address and port for the executor HTTP listener.
    pub listen_address: String,
    /// Kill a command still running after this many seconds. `0` disables the
    /// limit.
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// History store service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Address and port for the store HTTP listener.
    pub listen_address: String,
    /// Where records are kept.
    pub backend: StoreBackend,
    /// SQLite database file, used by the `sqlite` backend.
    pub db_path: PathBuf,
    /// Largest request body accepted, in bytes. A record carries the full
    /// output of its command. `0` disables the limit.
    pub max_body_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8081".to_string(),
            backend: StoreBackend::Memory,
            db_path: PathBuf::from("data/cmdledger.db"),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn body_limit(&self) -> Option<usize> {
        (self.max_body_bytes > 0).then_some(self.max_body_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory; lost on restart.
    Memory,
    /// A SQLite file at `db_path`.
    Sqlite,
}

// ---------------------------------------------------------------------------
// Forward
// ---------------------------------------------------------------------------

/// Forwarding of execution records to history store instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Store instance addresses (`host:port` or full URLs). Empty disables
    /// forwarding.
    pub instances: Vec<String>,
    /// Per-instance token bucket refill rate; also the burst capacity.
    pub rate_per_sec: u32,
    /// Attempts per record, across all instances.
    pub max_attempts: usize,
    /// Wall-clock budget for all attempts of one record (milliseconds).
    pub deadline_ms: u64,
    pub breaker: BreakerConfig,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            rate_per_sec: 100,
            max_attempts: 3,
            deadline_ms: 250,
            breaker: BreakerConfig::default(),
        }
    }
}

impl ForwardConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Replace the instance list with a comma-separated one, as accepted on
    /// the command line.
    pub fn set_instances(&mut self, list: &str) {
        self.instances = split_instances(list);
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_attempts >= 1, "forward.max_attempts must be at least 1");
        anyhow::ensure!(self.rate_per_sec >= 1, "forward.rate_per_sec must be at least 1");
        anyhow::ensure!(self.deadline_ms >= 1, "forward.deadline_ms must be at least 1");
        anyhow::ensure!(
            self.breaker.half_open_max_requests >= 1,
            "forward.breaker.half_open_max_requests must be at least 1"
        );
        Ok(())
    }
}

/// Circuit breaker thresholds, applied to every instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// The breaker opens once consecutive failures exceed this count.
    pub consecutive_failures: u32,
    /// Time spent open before admitting trial requests (seconds).
    pub open_timeout_secs: u64,
    /// Trial requests admitted while half-open; this many consecutive
    /// successes close the breaker again.
    pub half_open_max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 5,
            open_timeout_secs: 60,
            half_open_max_requests: 1,
        }
    }
}

impl BreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

/// Split a comma-separated instance list, trimming each entry and dropping
/// empty ones.
pub fn split_instances(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
