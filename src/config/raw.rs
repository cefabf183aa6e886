use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use super::polling::{PollingConfig, deserialize_duration};
use super::{Config, ConfigParseError, ServerConfig};

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) server: RawServerConfig,

    #[serde(default)]
    pub(super) polling: PollingConfig,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
pub(super) struct RawServerConfig {
    /// Scheduler base URL
    ///
    /// Example: "http://goflow.internal:8080"
    #[serde(default = "default_base_url")]
    pub(super) base_url: String,

    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_request_timeout"
    )]
    pub(super) request_timeout: Duration,
}

impl Default for RawServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
const fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

pub(super) fn parse_base_url(raw: &str) -> Result<Url, ConfigParseError> {
    let url = Url::parse(raw).map_err(|e| ConfigParseError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigParseError::UnsupportedScheme {
            url: raw.to_string(),
        });
    }
    Ok(url)
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigParseError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let base_url = parse_base_url(&raw.server.base_url)?;
        if raw.server.request_timeout.is_zero() {
            return Err(ConfigParseError::ZeroRequestTimeout);
        }

        Ok(Config {
            server: ServerConfig {
                base_url,
                request_timeout: raw.server.request_timeout,
            },
            polling: raw.polling.validated()?,
        })
    }
}
