//! Request/response boundary to the scheduler API.
//!
//! Implementations never retry. Every failure is handed back to the caller,
//! which owns the retry policy.

#[cfg(test)]
pub(crate) mod fake;
mod http;
mod wire;

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::job::{JobId, JobMetricSample, JobRun, JobSnapshot};

pub use self::http::HttpJobClient;
pub use self::wire::RecordError;

pub type ClientFuture<'a, T> = BoxFuture<'a, Result<T, ClientError>>;
pub type SharedJobApi = Arc<dyn JobApi>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Scheduler answered {url} with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Scheduler sent an unexpected response shape for {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Scheduler sent an invalid job record for {url}: {source}")]
    InvalidRecord {
        url: String,
        #[source]
        source: RecordError,
    },
}

/// Outcome of a toggle command as confirmed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleConfirmation {
    pub id: JobId,
    pub enabled: bool,
    /// The full record, when the scheduler sends one back.
    pub snapshot: Option<JobSnapshot>,
}

pub trait JobApi: Send + Sync {
    fn list_jobs(&self) -> ClientFuture<'_, Vec<JobSnapshot>>;

    fn get_job<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, JobSnapshot>;

    fn get_job_runs<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobRun>>;

    fn get_job_metrics<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobMetricSample>>;

    /// Sends the enable/disable command. The scheduler only knows how to flip
    /// the flag, so `desired` is what the caller expects the outcome to be.
    fn set_enabled<'a>(&'a self, id: &'a JobId, desired: bool)
    -> ClientFuture<'a, ToggleConfirmation>;
}
