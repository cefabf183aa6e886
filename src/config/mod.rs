mod polling;
mod raw;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use self::raw::{RawConfig, parse_base_url};

pub use self::polling::{MIN_POLL_INTERVAL, PollingConfig};
pub(crate) use self::polling::parse_duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    /// Transport-level timeout for every request to the scheduler.
    pub request_timeout: Duration,
}

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigParseError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigParseError {
    #[error("Scheduler URL '{url}' is not a valid URL: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Scheduler URL '{url}' must be an http or https URL")]
    UnsupportedScheme { url: String },

    #[error("Poll interval {interval:?} is shorter than the minimum of {minimum:?}")]
    PollIntervalTooShort { interval: Duration, minimum: Duration },

    #[error("Request timeout must be greater than zero")]
    ZeroRequestTimeout,
}

impl Default for Config {
    fn default() -> Self {
        // The default raw config always validates.
        match Config::try_from(RawConfig::default()) {
            Ok(config) => config,
            Err(e) => unreachable!("default config is invalid: {e}"),
        }
    }
}

impl Config {
    pub async fn new_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&content, path)
    }

    fn from_yaml_str(content: &str, path: &Path) -> Result<Self, ConfigLoadError> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigLoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        Config::try_from(raw).map_err(|source| ConfigLoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigParseError> {
        self.server.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self, ConfigParseError> {
        self.polling.interval = interval;
        self.polling = self.polling.validated()?;
        Ok(self)
    }
}
