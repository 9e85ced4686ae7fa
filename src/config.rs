use serde::Deserialize;

use std::{env, fs, path::Path, time::Duration};

use crate::connection::{ConnectionOptions, RetryPolicy, WriteDurability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    #[default]
    Production,
}

impl RunMode {
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Flat so the same shape loads from YAML and from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub client_origins: Vec<String>,
    #[serde(default)]
    pub app_mode: RunMode,
    #[serde(default = "default_true")]
    pub validate_notes: bool,

    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default = "default_server_selection_timeout", with = "humantime_serde")]
    pub server_selection_timeout: Duration,
    #[serde(default = "default_socket_timeout", with = "humantime_serde")]
    pub socket_timeout: Duration,
    #[serde(default)]
    pub write_durability: WriteDurability,
    #[serde(default = "default_true")]
    pub retryable_writes: bool,

    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,
    #[serde(default = "default_connect_retry_delay", with = "humantime_serde")]
    pub connect_retry_delay: Duration,
}

const fn default_port() -> u16 {
    5001
}

const fn default_true() -> bool {
    true
}

const fn default_min_pool_size() -> usize {
    1
}

const fn default_max_pool_size() -> usize {
    10
}

const fn default_server_selection_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_connect_max_attempts() -> u32 {
    5
}

const fn default_connect_retry_delay() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("no config file found and environment is incomplete: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pool_size == 0 {
            return Err(ConfigError::Invalid("max_pool_size must be at least 1"));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(ConfigError::Invalid(
                "min_pool_size must not exceed max_pool_size",
            ));
        }
        if self.connect_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "connect_max_attempts must be at least 1",
            ));
        }

        Ok(())
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            server_selection_timeout: self.server_selection_timeout,
            socket_timeout: self.socket_timeout,
            write_durability: self.write_durability,
            retryable_writes: self.retryable_writes,
        }
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_max_attempts,
            delay: self.connect_retry_delay,
        }
    }
}

fn load_from_file(path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Loads variables from a dotenv file. Variables already set in the process
/// environment keep their value.
fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => tracing::info!("Loaded environment from '{}'", path.display()),
        Err(e) if e.not_found() => {
            tracing::debug!("No env file at '{}': {e}", path.display());
        }
        Err(e) => tracing::warn!("Failed to load env file '{}': {e}", path.display()),
    }
}

/// Picks the YAML file to load: the requested one when it exists, otherwise
/// `config.yaml` when present.
fn config_file(requested: Option<String>) -> Option<String> {
    let default_exists = Path::new(DEFAULT_CONFIG_FILE).exists();

    match requested {
        Some(path) if Path::new(&path).exists() => Some(path),
        Some(path) if default_exists => {
            tracing::warn!(
                "Config file '{}' not found, falling back to '{}'",
                path,
                DEFAULT_CONFIG_FILE
            );
            Some(DEFAULT_CONFIG_FILE.to_string())
        }
        Some(path) => {
            tracing::warn!("Config file '{path}' not found");
            None
        }
        None => default_exists.then(|| DEFAULT_CONFIG_FILE.to_string()),
    }
}

/// Reads `.env`, then loads the file named by `NOTES_CONFIG` or `config.yaml`,
/// and otherwise falls back to environment variables. The result is
/// validated before it is returned.
pub fn load_config() -> Result<Config, ConfigError> {
    load_env_file(Path::new(".env"));

    let config = if let Some(path) = config_file(env::var("NOTES_CONFIG").ok()) {
        load_from_file(&path)?
    } else {
        tracing::info!(
            "No config file found, attempting to load configuration from environment variables"
        );
        envy::from_env::<Config>()?
    };

    config.validate()?;
    Ok(config)
}
