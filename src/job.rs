use std::fmt::{self, Display};

use chrono::{DateTime, TimeDelta, Utc};

/// Unique job name. Primary key for every job-keyed collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(name: impl Into<String>) -> Self {
        JobId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(name: &str) -> Self {
        JobId::new(name)
    }
}

impl From<String> for JobId {
    fn from(name: String) -> Self {
        JobId(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub name: JobId,
    pub namespace: String,
    /// Cron expression as understood by the scheduler.
    pub schedule: String,
    pub command: Vec<String>,
    pub retries: u32,
    pub docker_image: String,
}

impl JobConfig {
    /// Config with only the name known, used while nothing has been fetched yet.
    pub fn placeholder(name: JobId) -> Self {
        JobConfig {
            name,
            namespace: String::new(),
            schedule: String::new(),
            command: Vec::new(),
            retries: 0,
            docker_image: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    /// `None` while the run is still executing.
    pub end_time: Option<DateTime<Utc>>,
    pub execution_date: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Wall time of the run; for a running run, the time elapsed until `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }

    fn recency_key(&self) -> Option<DateTime<Utc>> {
        self.execution_date.or(self.start_time)
    }
}

/// Puts runs in most-recent-first order. Runs without any timestamp sink to the end.
/// The sort is stable, so server order is kept between runs with equal keys.
pub(crate) fn order_most_recent_first(runs: &mut [JobRun]) {
    runs.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}

/// The run shown as "current" in the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveRun {
    Run(String),
    NoneYet,
}

impl Display for ActiveRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveRun::Run(name) => f.write_str(name),
            ActiveRun::NoneYet => f.write_str("none yet"),
        }
    }
}

/// Locally cached view of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub config: JobConfig,
    pub enabled: bool,
    /// Most recent first.
    pub runs: Vec<JobRun>,
    pub most_recent_execution: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn id(&self) -> &JobId {
        &self.config.name
    }

    pub fn placeholder(id: JobId) -> Self {
        JobSnapshot {
            config: JobConfig::placeholder(id),
            enabled: false,
            runs: Vec::new(),
            most_recent_execution: None,
            last_updated: None,
        }
    }

    pub fn active_run(&self) -> ActiveRun {
        match self.runs.first() {
            Some(run) => ActiveRun::Run(run.name.clone()),
            None => ActiveRun::NoneYet,
        }
    }

    pub fn last_run_time(&self) -> Option<DateTime<Utc>> {
        self.most_recent_execution
            .or_else(|| self.runs.first().and_then(|run| run.start_time))
    }
}

/// One resource-usage reading of a pod belonging to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobMetricSample {
    pub id: i64,
    pub job: JobId,
    pub pod_name: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}
