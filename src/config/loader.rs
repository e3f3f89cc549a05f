//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources, lowest
//! precedence first:
//!
//! 1. the base TOML file (optional)
//! 2. `{environment}.toml` next to the base file (optional)
//! 3. `DOCSYNC__SECTION__KEY` environment variables
//!
//! The merged result is validated before it is returned.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestrationConfig;

pub const DEFAULT_ENV_PREFIX: &str = "DOCSYNC";
pub const DEFAULT_CONFIG_PATH: &str = "config/orchestration.toml";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_file: PathBuf,
    environment: String,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

impl ConfigLoader {
    pub fn new(base_file: impl Into<PathBuf>) -> Self {
        Self {
            base_file: base_file.into(),
            environment: Self::detect_environment(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Override the detected environment (useful for tests)
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Override the environment-variable prefix (useful for tests)
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// `DOCSYNC_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var("DOCSYNC_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    fn overlay_file(&self) -> PathBuf {
        let directory = self.base_file.parent().unwrap_or_else(|| Path::new("."));
        directory.join(format!("{}.toml", self.environment))
    }

    pub fn load(&self) -> ConfigResult<OrchestrationConfig> {
        let overlay = self.overlay_file();
        debug!(
            base = %self.base_file.display(),
            overlay = %overlay.display(),
            environment = %self.environment,
            "Loading orchestration configuration"
        );

        let settings = Config::builder()
            .add_source(file_source(&self.base_file)?)
            .add_source(file_source(&overlay)?)
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                ConfigurationError::parse_error(self.base_file.display().to_string(), e)
            })?;

        let config: OrchestrationConfig = settings.try_deserialize().map_err(|e| {
            ConfigurationError::parse_error(self.base_file.display().to_string(), e)
        })?;

        config.validate()?;

        debug!(
            environment = %self.environment,
            backend = ?config.coordination.backend,
            watchdog_enabled = config.watchdog.enabled,
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}

/// Optional TOML source; a path that exists but cannot be read is an error
fn file_source(path: &Path) -> ConfigResult<File<config::FileSourceFile, FileFormat>> {
    if path.exists() && !path.is_file() {
        return Err(ConfigurationError::FileReadError {
            file_path: path.display().to_string(),
            error: "not a regular file".to_string(),
        });
    }
    Ok(File::from(path).format(FileFormat::Toml).required(false))
}
