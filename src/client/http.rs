use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::wire::{WireDag, WireDagRun, WireMetric, WireToggled, expect_name, map_runs};
use super::{ClientError, ClientFuture, JobApi, RecordError, ToggleConfirmation};
use crate::config::ServerConfig;
use crate::job::{JobId, JobMetricSample, JobRun, JobSnapshot};

/// [`JobApi`] over the scheduler's REST interface.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpJobClient {
    pub fn new(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpJobClient {
            http,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends path segments to the base URL. Job names are percent-encoded
    /// as single segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn fetch<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T, ClientError> {
        debug!(%method, %url, "Sending request to scheduler");
        let response = self
            .http
            .request(method, url.clone())
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        serde_json::from_slice(&body).map_err(|source| ClientError::Malformed {
            url: url.to_string(),
            source,
        })
    }

    #[instrument("http_client/list_jobs", skip(self), level = "debug")]
    async fn list_jobs_inner(&self) -> Result<Vec<JobSnapshot>, ClientError> {
        let url = self.endpoint(&["dags"]);
        let dags: Vec<WireDag> = self.fetch(Method::GET, url.clone()).await?;
        dags.into_iter()
            .map(JobSnapshot::try_from)
            .collect::<Result<Vec<_>, RecordError>>()
            .map_err(|source| invalid(&url, source))
    }

    #[instrument("http_client/get_job", skip(self), fields(job = %id), level = "debug")]
    async fn get_job_inner(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        let url = self.endpoint(&["dag", id.as_str()]);
        let dag: WireDag = self.fetch(Method::GET, url.clone()).await?;
        let snapshot = JobSnapshot::try_from(dag).map_err(|source| invalid(&url, source))?;
        expect_name(id, &snapshot).map_err(|source| invalid(&url, source))?;
        Ok(snapshot)
    }

    #[instrument("http_client/get_job_runs", skip(self), fields(job = %id), level = "debug")]
    async fn get_job_runs_inner(&self, id: &JobId) -> Result<Vec<JobRun>, ClientError> {
        let url = self.endpoint(&["dag", id.as_str(), "runs"]);
        let runs: Option<Vec<WireDagRun>> = self.fetch(Method::GET, url).await?;
        Ok(map_runs(runs))
    }

    #[instrument("http_client/get_job_metrics", skip(self), fields(job = %id), level = "debug")]
    async fn get_job_metrics_inner(&self, id: &JobId) -> Result<Vec<JobMetricSample>, ClientError> {
        let url = self.endpoint(&["dag", id.as_str(), "metrics"]);
        let metrics: Option<Vec<WireMetric>> = self.fetch(Method::GET, url).await?;
        Ok(metrics
            .unwrap_or_default()
            .into_iter()
            .map(JobMetricSample::from)
            .collect())
    }

    #[instrument("http_client/toggle", skip(self), fields(job = %id), level = "debug")]
    async fn toggle_inner(&self, id: &JobId, desired: bool) -> Result<ToggleConfirmation, ClientError> {
        let url = self.endpoint(&["dag", id.as_str(), "toggle"]);
        let toggled: WireToggled = self.fetch(Method::PUT, url.clone()).await?;
        let enabled = toggled.is_on;
        let snapshot = toggled
            .into_snapshot()
            .map_err(|source| invalid(&url, source))?;
        if let Some(snapshot) = &snapshot {
            expect_name(id, snapshot).map_err(|source| invalid(&url, source))?;
        }
        if enabled != desired {
            debug!(desired, enabled, "Scheduler confirmed a different state than requested");
        }

        Ok(ToggleConfirmation {
            id: id.clone(),
            enabled,
            snapshot,
        })
    }
}

fn invalid(url: &Url, source: RecordError) -> ClientError {
    ClientError::InvalidRecord {
        url: url.to_string(),
        source,
    }
}

impl JobApi for HttpJobClient {
    fn list_jobs(&self) -> ClientFuture<'_, Vec<JobSnapshot>> {
        Box::pin(self.list_jobs_inner())
    }

    fn get_job<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, JobSnapshot> {
        Box::pin(self.get_job_inner(id))
    }

    fn get_job_runs<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobRun>> {
        Box::pin(self.get_job_runs_inner(id))
    }

    fn get_job_metrics<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobMetricSample>> {
        Box::pin(self.get_job_metrics_inner(id))
    }

    fn set_enabled<'a>(
        &'a self,
        id: &'a JobId,
        desired: bool,
    ) -> ClientFuture<'a, ToggleConfirmation> {
        Box::pin(self.toggle_inner(id, desired))
    }
}
