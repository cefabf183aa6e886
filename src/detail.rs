//! Per-job detail page: one job's tabs assembled from the store and on-demand fetches.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::client::SharedJobApi;
use crate::job::{ActiveRun, JobId, JobMetricSample, JobRun, JobSnapshot};
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailTab {
    #[default]
    Metrics,
    Timeline,
    RunTimes,
    Resources,
    Config,
}

impl DetailTab {
    pub const ALL: [DetailTab; 5] = [
        DetailTab::Metrics,
        DetailTab::Timeline,
        DetailTab::RunTimes,
        DetailTab::Resources,
        DetailTab::Config,
    ];

    /// Path segment used in routes.
    pub fn slug(self) -> &'static str {
        match self {
            DetailTab::Metrics => "metrics",
            DetailTab::Timeline => "timeline",
            DetailTab::RunTimes => "runtimes",
            DetailTab::Resources => "resources",
            DetailTab::Config => "config",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DetailTab::Metrics => "Metrics",
            DetailTab::Timeline => "Timeline",
            DetailTab::RunTimes => "Run Times",
            DetailTab::Resources => "Resource Usage",
            DetailTab::Config => "Config",
        }
    }
}

impl Display for DetailTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown tab '{0}'")]
pub struct UnknownTab(pub String);

impl FromStr for DetailTab {
    type Err = UnknownTab;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetailTab::ALL
            .into_iter()
            .find(|tab| tab.slug() == s)
            .ok_or_else(|| UnknownTab(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Metrics {
    NotRequested,
    Loaded(Vec<JobMetricSample>),
    Unavailable,
}

/// State of a mounted detail page for one job.
pub struct DetailView {
    client: SharedJobApi,
    store: JobStore,
    id: JobId,
    tab: DetailTab,
    detail: Option<JobSnapshot>,
    /// History from the last successful `refresh_runs`, newer than `detail`.
    runs: Option<Vec<JobRun>>,
    metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailPage {
    pub id: JobId,
    /// `None` until either the store or the detail fetch knows the job.
    pub enabled: Option<bool>,
    pub active_run: ActiveRun,
    pub tab: DetailTab,
    pub body: TabBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TabBody {
    Metrics(MetricsSummary),
    Timeline(Vec<JobRun>),
    RunTimes(Vec<RunTime>),
    Resources(Vec<JobMetricSample>),
    Config(Vec<(&'static str, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub current_run: ActiveRun,
    pub schedule: String,
    pub finished_runs: usize,
    pub running_runs: usize,
    pub max_memory: Option<f64>,
    pub max_cpu: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTime {
    pub run: String,
    pub duration: Option<TimeDelta>,
    pub running: bool,
}

impl DetailView {
    /// Mounts the page: fetches the job once, plus its metrics if the
    /// resource tab is the one being opened. Fetch failures leave the page
    /// showing whatever the store has, or placeholders.
    #[instrument("detail/activate", skip(client, store), fields(job = %id))]
    pub async fn activate(
        client: SharedJobApi,
        store: JobStore,
        id: JobId,
        tab: DetailTab,
    ) -> DetailView {
        let detail = match client.get_job(&id).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Could not load job details, showing placeholders: {e}");
                None
            }
        };

        let mut view = DetailView {
            client,
            store,
            id,
            tab: DetailTab::default(),
            detail,
            runs: None,
            metrics: Metrics::NotRequested,
        };
        view.select_tab(tab).await;
        view
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn tab(&self) -> DetailTab {
        self.tab
    }

    /// Switches tabs. Entering the resource tab fetches a fresh metrics window.
    pub async fn select_tab(&mut self, tab: DetailTab) {
        let entering_resources = tab == DetailTab::Resources
            && (self.tab != DetailTab::Resources || self.metrics == Metrics::NotRequested);
        self.tab = tab;
        if entering_resources {
            self.load_metrics().await;
        }
    }

    #[instrument("detail/load_metrics", skip(self), fields(job = %self.id))]
    async fn load_metrics(&mut self) {
        self.metrics = match self.client.get_job_metrics(&self.id).await {
            Ok(samples) => {
                debug!(samples = samples.len(), "Loaded metrics window.");
                Metrics::Loaded(samples)
            }
            Err(e) => {
                warn!("Could not load metrics: {e}");
                Metrics::Unavailable
            }
        };
    }

    /// Re-reads the run history. Keeps the previous history on failure.
    #[instrument("detail/refresh_runs", skip(self), fields(job = %self.id))]
    pub async fn refresh_runs(&mut self) {
        match self.client.get_job_runs(&self.id).await {
            Ok(runs) => self.runs = Some(runs),
            Err(e) => warn!("Could not refresh run history: {e}"),
        }
    }

    pub async fn compose(&self) -> DetailPage {
        self.compose_at(Utc::now()).await
    }

    pub async fn compose_at(&self, now: DateTime<Utc>) -> DetailPage {
        let live = self.store.get(&self.id).await;
        let enabled = live
            .as_ref()
            .or(self.detail.as_ref())
            .map(|snapshot| snapshot.enabled);
        let mut job = self
            .detail
            .clone()
            .or(live)
            .unwrap_or_else(|| JobSnapshot::placeholder(self.id.clone()));
        if let Some(runs) = &self.runs {
            job.runs = runs.clone();
        }

        DetailPage {
            id: self.id.clone(),
            enabled,
            active_run: job.active_run(),
            tab: self.tab,
            body: self.body(&job, now),
        }
    }

    fn samples(&self) -> &[JobMetricSample] {
        match &self.metrics {
            Metrics::Loaded(samples) => samples,
            Metrics::NotRequested | Metrics::Unavailable => &[],
        }
    }

    fn body(&self, job: &JobSnapshot, now: DateTime<Utc>) -> TabBody {
        match self.tab {
            DetailTab::Metrics => TabBody::Metrics(self.summary(job)),
            DetailTab::Timeline => TabBody::Timeline(job.runs.clone()),
            DetailTab::RunTimes => TabBody::RunTimes(
                job.runs
                    .iter()
                    .map(|run| RunTime {
                        run: run.name.clone(),
                        duration: run.duration(now),
                        running: run.is_running(),
                    })
                    .collect(),
            ),
            DetailTab::Resources => TabBody::Resources(self.samples().to_vec()),
            DetailTab::Config => TabBody::Config(config_rows(job)),
        }
    }

    fn summary(&self, job: &JobSnapshot) -> MetricsSummary {
        let running_runs = job.runs.iter().filter(|run| run.is_running()).count();
        let samples = self.samples();
        MetricsSummary {
            current_run: job.active_run(),
            schedule: job.config.schedule.clone(),
            finished_runs: job.runs.len() - running_runs,
            running_runs,
            max_memory: samples.iter().map(|s| s.memory_usage).reduce(f64::max),
            max_cpu: samples.iter().map(|s| s.cpu_usage).reduce(f64::max),
        }
    }
}

fn config_rows(job: &JobSnapshot) -> Vec<(&'static str, String)> {
    let config = &job.config;
    vec![
        ("Name", config.name.to_string()),
        ("Namespace", config.namespace.clone()),
        ("Schedule", config.schedule.clone()),
        ("Command", config.command.join(" ")),
        ("Retries", config.retries.to_string()),
        ("Docker Image", config.docker_image.clone()),
    ]
}
