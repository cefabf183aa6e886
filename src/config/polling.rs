use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Deserializer};

use super::ConfigParseError;

/// Lower bound for the poll cadence. Anything faster hammers the scheduler.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct PollingConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_poll_interval"
    )]
    pub(crate) interval: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_initial_wait"
    )]
    pub(crate) initial_wait: Duration,

    /// Consecutive failed ticks after which failures are reported as errors
    /// instead of warnings.
    #[serde(default = "default_error_report_threshold")]
    pub(crate) error_report_threshold: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            initial_wait: default_initial_wait(),
            error_report_threshold: default_error_report_threshold(),
        }
    }
}

impl PollingConfig {
    pub fn new(interval: Duration) -> Result<Self, ConfigParseError> {
        PollingConfig {
            interval,
            ..Default::default()
        }
        .validated()
    }

    pub fn with_initial_wait(mut self, initial_wait: Duration) -> Self {
        self.initial_wait = initial_wait;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    pub fn error_report_threshold(&self) -> u64 {
        self.error_report_threshold
    }

    pub(crate) fn validated(self) -> Result<Self, ConfigParseError> {
        if self.interval < MIN_POLL_INTERVAL {
            return Err(ConfigParseError::PollIntervalTooShort {
                interval: self.interval,
                minimum: MIN_POLL_INTERVAL,
            });
        }
        Ok(self)
    }
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationString::deserialize(deserializer).map(Duration::from)
}

/// Parses human durations such as `5s` or `500ms` from the command line.
pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    value
        .parse::<DurationString>()
        .map(Duration::from)
        .map_err(|e| e.to_string())
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}
const fn default_initial_wait() -> Duration {
    Duration::ZERO
}
const fn default_error_report_threshold() -> u64 {
    5
}
