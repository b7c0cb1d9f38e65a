//! Configuration Loader
//!
//! Environment-aware layered loading built on the `config` crate:
//!
//! 1. `{dir}/phase-dispatch.{toml,yaml,json}` (optional)
//! 2. `{dir}/phase-dispatch.{environment}.{toml,yaml,json}` (optional)
//! 3. `PHASE_DISPATCH__SECTION__KEY` environment variables

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::DispatcherConfig;

const BASE_NAME: &str = "phase-dispatch";
const DEFAULT_ENV_PREFIX: &str = "PHASE_DISPATCH";
const EXTENSIONS: [&str; 3] = ["toml", "yaml", "json"];

/// Layered configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    env_prefix: String,
}

impl ConfigLoader {
    /// Load from `./config` with the detected environment
    pub fn load() -> ConfigResult<DispatcherConfig> {
        Self::new(PathBuf::from("config")).build()
    }

    pub fn new(config_directory: impl Into<PathBuf>) -> Self {
        Self {
            config_directory: config_directory.into(),
            environment: Self::detect_environment(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Use an explicit environment instead of detecting it
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Merge every layer, deserialize and validate
    pub fn build(&self) -> ConfigResult<DispatcherConfig> {
        debug!(
            environment = %self.environment,
            directory = %self.config_directory.display(),
            "Loading dispatcher configuration"
        );

        let mut builder = Config::builder();
        for stem in [BASE_NAME.to_string(), format!("{BASE_NAME}.{}", self.environment)] {
            for path in self.layer_files(&stem) {
                debug!(file = %path.display(), "Adding configuration layer");
                builder = builder.add_source(File::from(path.as_path()).required(true));
            }
        }
        let config = builder.add_source(self.env_source()).build()?;

        Self::finish(config)
    }

    /// Load a single required file, still honouring environment overrides
    pub fn load_from_file(path: &Path) -> ConfigResult<DispatcherConfig> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let loader = Self::new(path.parent().unwrap_or_else(|| Path::new(".")));
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(loader.env_source())
            .build()?;

        Self::finish(config)
    }

    /// Existing files for a layer stem. Extensions are spelled out because the
    /// environment suffix would otherwise be mistaken for a file extension.
    fn layer_files(&self, stem: &str) -> Vec<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.config_directory.join(format!("{stem}.{ext}")))
            .filter(|path| path.is_file())
            .collect()
    }

    fn env_source(&self) -> Environment {
        Environment::with_prefix(&self.env_prefix)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> ConfigResult<DispatcherConfig> {
        let dispatcher: DispatcherConfig = config.try_deserialize()?;
        dispatcher.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&dispatcher)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(dispatcher)
    }

    /// Detect the deployment environment from environment variables
    pub fn detect_environment() -> String {
        env::var("PHASE_DISPATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AffinityMode;
    use std::fs;

    fn isolated(dir: &Path) -> ConfigLoader {
        ConfigLoader::new(dir)
            .with_environment("test")
            .with_env_prefix("PHASE_DISPATCH_UNIT_TEST_UNUSED")
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = isolated(dir.path()).build().unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_environment_overlay_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("phase-dispatch.toml"),
            "[workers]\nworker_threads = 3\nthread_name = \"base\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("phase-dispatch.test.toml"),
            "[workers]\nworker_threads = 5\n\n[affinity]\nmode = \"dedicated_thread\"\n",
        )
        .unwrap();

        let config = isolated(dir.path()).build().unwrap();
        assert_eq!(config.workers.worker_threads, 5);
        assert_eq!(config.workers.thread_name, "base");
        assert_eq!(config.affinity.mode, AffinityMode::DedicatedThread);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("phase-dispatch.toml"),
            "[workers]\nmax_blocking_threads = 0\n",
        )
        .unwrap();

        let err = isolated(dir.path()).build().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ConfigLoader::load_from_file(Path::new("/nonexistent/dispatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }
}
