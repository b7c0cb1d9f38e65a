//! # Dispatcher Configuration
//!
//! Typed configuration for the worker pool, the affinity executor and the
//! logging bootstrap. Every section has defaults, so an empty configuration is
//! valid; file and environment layers only override what they name.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use phase_dispatch::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // config/phase-dispatch.toml, config/phase-dispatch.{env}.toml,
//! // then PHASE_DISPATCH__WORKERS__WORKER_THREADS=8 style overrides
//! let config = ConfigLoader::load()?;
//! assert!(config.workers.worker_threads > 0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Threads running Execute and async refresh units
    pub workers: WorkerPoolConfig,

    /// Delivery context for outcome, complete and data-refreshed handlers
    pub affinity: AffinityConfig,

    pub logging: LoggingConfig,
}

impl DispatcherConfig {
    /// Reject configurations that cannot start a dispatcher
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers.worker_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.worker_threads",
                "must be at least 1",
            ));
        }
        if self.workers.max_blocking_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.max_blocking_threads",
                "must be at least 1",
            ));
        }
        if self.workers.thread_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "workers.thread_name",
                "must not be empty",
            ));
        }
        if self.affinity.mode == AffinityMode::DedicatedThread
            && self.affinity.thread_name.trim().is_empty()
        {
            return Err(ConfigurationError::invalid_value(
                "affinity.thread_name",
                "must not be empty when mode is dedicated_thread",
            ));
        }
        if let Some(level) = &self.logging.level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigurationError::invalid_value(
                    "logging.level",
                    format!("unknown level '{level}', expected one of {LOG_LEVELS:?}"),
                ));
            }
        }
        Ok(())
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Async worker threads of the owned runtime
    pub worker_threads: usize,
    /// Upper bound on concurrently running handler units
    pub max_blocking_threads: usize,
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: 64,
            thread_name: "phase-dispatch-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityMode {
    /// Deliver on the thread that finished the preceding phase
    #[default]
    Inline,
    /// Deliver on one dedicated, named thread
    DedicatedThread,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub mode: AffinityMode,
    pub thread_name: String,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            mode: AffinityMode::Inline,
            thread_name: "phase-dispatch-affinity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter level; derived from the environment when absent
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
