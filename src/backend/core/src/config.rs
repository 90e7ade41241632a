//! Configuration management.
//!
//! Values come from an optional file, then from the environment with the
//! `TASKHIVE__` prefix and `__` as the nesting separator, e.g.
//! `TASKHIVE__WORKERS__COUNT=4`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HiveError, Result};
use crate::orchestrator::KillPolicy;
use crate::telemetry::TelemetryConfig;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TASKHIVE";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Worker pool and dispatcher configuration
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    /// Number of workers started with the dispatcher
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Upper bound on pool size
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Interval between dispatch ticks
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Interval between timeout sweeps
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// What happens to a task whose worker is killed
    #[serde(default)]
    pub kill_policy: KillPolicy,

    /// Number of failed/killed tasks retained for inspection
    #[serde(default = "default_finished_capacity")]
    pub finished_capacity: usize,

    /// Timeout applied to tasks enqueued without one
    #[serde(default, with = "humantime_serde")]
    pub default_timeout: Option<Duration>,

    /// Attempts allowed for tasks enqueued without an explicit value
    #[serde(default = "default_repeats")]
    pub default_repeats: u32,

    /// How often the configuration is re-read so `count` can grow the pool
    /// at runtime; `None` disables reloading
    #[serde(default, with = "humantime_serde")]
    pub reload_interval: Option<Duration>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            max_workers: default_max_workers(),
            tick_interval: default_tick_interval(),
            sweep_interval: default_sweep_interval(),
            kill_policy: KillPolicy::default(),
            finished_capacity: default_finished_capacity(),
            default_timeout: None,
            default_repeats: default_repeats(),
            reload_interval: None,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_worker_count() -> usize { 2 }
fn default_max_workers() -> usize { 100 }
fn default_tick_interval() -> Duration { Duration::from_secs(1) }
fn default_sweep_interval() -> Duration { Duration::from_secs(1) }
fn default_finished_capacity() -> usize { 1000 }
fn default_repeats() -> u32 { 1 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        let workers = &self.workers;

        if workers.max_workers == 0 {
            return Err(HiveError::configuration("workers.max_workers must be at least 1"));
        }
        if workers.count > workers.max_workers {
            return Err(HiveError::configuration(format!(
                "workers.count ({}) exceeds workers.max_workers ({})",
                workers.count, workers.max_workers
            )));
        }
        if workers.tick_interval.is_zero() {
            return Err(HiveError::configuration("workers.tick_interval must be non-zero"));
        }
        if workers.sweep_interval.is_zero() {
            return Err(HiveError::configuration("workers.sweep_interval must be non-zero"));
        }
        if workers.default_repeats == 0 {
            return Err(HiveError::configuration("workers.default_repeats must be at least 1"));
        }
        if matches!(workers.default_timeout, Some(t) if t.is_zero()) {
            return Err(HiveError::configuration("workers.default_timeout must be non-zero"));
        }
        if matches!(workers.reload_interval, Some(t) if t.is_zero()) {
            return Err(HiveError::configuration("workers.reload_interval must be non-zero"));
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
