//! Records as the scheduler serializes them, and their mapping into the job model.
//!
//! Field names on the wire are PascalCase. Go zero timestamps and `null`
//! collections are normalized here so nothing downstream has to care.

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::job::{JobConfig, JobId, JobMetricSample, JobRun, JobSnapshot, order_most_recent_first};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireDag {
    pub(crate) config: WireDagConfig,
    pub(crate) is_on: bool,
    #[serde(rename = "DAGRuns")]
    pub(crate) dag_runs: Option<Vec<WireDagRun>>,
    pub(crate) most_recent_execution: Option<DateTime<Utc>>,
    pub(crate) last_updated: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireDagConfig {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) namespace: String,
    #[serde(default)]
    pub(crate) schedule: String,
    pub(crate) command: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) retries: i64,
    #[serde(default)]
    pub(crate) docker_image: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireDagRun {
    #[serde(default)]
    pub(crate) name: String,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) execution_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireMetric {
    #[serde(rename = "ID")]
    pub(crate) id: i64,
    pub(crate) dag_name: String,
    #[serde(default)]
    pub(crate) pod_name: String,
    pub(crate) memory: f64,
    #[serde(rename = "CPU")]
    pub(crate) cpu: f64,
    pub(crate) metric_time: DateTime<Utc>,
}

/// Body of a toggle response. Only `IsOn` is guaranteed; the rest of the
/// record is used when the server sends it.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireToggled {
    pub(crate) is_on: bool,
    pub(crate) config: Option<WireDagConfig>,
    #[serde(rename = "DAGRuns")]
    pub(crate) dag_runs: Option<Vec<WireDagRun>>,
    pub(crate) most_recent_execution: Option<DateTime<Utc>>,
    pub(crate) last_updated: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("job record has an empty name")]
    EmptyName,

    #[error("expected job record '{expected}', but the server returned '{found}'")]
    NameMismatch { expected: JobId, found: JobId },

    #[error("job '{name}' has a negative retry count ({retries})")]
    NegativeRetries { name: JobId, retries: i64 },
}

/// Go serializes an unset `time.Time` as year 1 instead of omitting it.
fn present(time: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    time.filter(|t| t.year() > 1)
}

impl TryFrom<WireDagConfig> for JobConfig {
    type Error = RecordError;

    fn try_from(wire: WireDagConfig) -> Result<Self, Self::Error> {
        if wire.name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        let name = JobId::new(wire.name);
        let retries = u32::try_from(wire.retries).map_err(|_| RecordError::NegativeRetries {
            name: name.clone(),
            retries: wire.retries,
        })?;

        Ok(JobConfig {
            name,
            namespace: wire.namespace,
            schedule: wire.schedule,
            command: wire.command.unwrap_or_default(),
            retries,
            docker_image: wire.docker_image,
        })
    }
}

impl From<WireDagRun> for JobRun {
    fn from(wire: WireDagRun) -> Self {
        JobRun {
            name: wire.name,
            start_time: present(wire.start_time),
            end_time: present(wire.end_time),
            execution_date: present(wire.execution_date),
        }
    }
}

pub(crate) fn map_runs(wire: Option<Vec<WireDagRun>>) -> Vec<JobRun> {
    let mut runs: Vec<JobRun> = wire
        .unwrap_or_default()
        .into_iter()
        .map(JobRun::from)
        .collect();
    order_most_recent_first(&mut runs);
    runs
}

impl TryFrom<WireDag> for JobSnapshot {
    type Error = RecordError;

    fn try_from(wire: WireDag) -> Result<Self, Self::Error> {
        Ok(JobSnapshot {
            config: wire.config.try_into()?,
            enabled: wire.is_on,
            runs: map_runs(wire.dag_runs),
            most_recent_execution: present(wire.most_recent_execution),
            last_updated: present(wire.last_updated),
        })
    }
}

impl From<WireMetric> for JobMetricSample {
    fn from(wire: WireMetric) -> Self {
        JobMetricSample {
            id: wire.id,
            job: JobId::new(wire.dag_name),
            pod_name: wire.pod_name,
            timestamp: wire.metric_time,
            cpu_usage: wire.cpu,
            memory_usage: wire.memory,
        }
    }
}

impl WireToggled {
    /// The full record, if the server sent one.
    pub(crate) fn into_snapshot(self) -> Result<Option<JobSnapshot>, RecordError> {
        let Some(config) = self.config else {
            return Ok(None);
        };
        Ok(Some(JobSnapshot {
            config: config.try_into()?,
            enabled: self.is_on,
            runs: map_runs(self.dag_runs),
            most_recent_execution: present(self.most_recent_execution),
            last_updated: present(self.last_updated),
        }))
    }
}

/// Rejects a record that does not belong to the requested job.
pub(crate) fn expect_name(expected: &JobId, snapshot: &JobSnapshot) -> Result<(), RecordError> {
    if snapshot.id() != expected {
        return Err(RecordError::NameMismatch {
            expected: expected.clone(),
            found: snapshot.id().clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn dag_json() -> serde_json::Value {
        json!({
            "Config": {
                "Name": "etl-daily",
                "Namespace": "default",
                "Schedule": "0 * * * *",
                "Command": ["python", "etl.py"],
                "Retries": 2,
                "DockerImage": "busybox:latest",
                "Parallelism": 1
            },
            "IsOn": true,
            "DAGRuns": [
                {
                    "Name": "etl-daily-1",
                    "StartTime": "2021-03-01T01:00:00Z",
                    "EndTime": "2021-03-01T01:05:00Z",
                    "ExecutionDate": "2021-03-01T01:00:00Z"
                },
                {
                    "Name": "etl-daily-2",
                    "StartTime": "2021-03-01T02:00:00Z",
                    "EndTime": null,
                    "ExecutionDate": "2021-03-01T02:00:00Z"
                }
            ],
            "MostRecentExecution": "2021-03-01T02:00:00Z",
            "LastUpdated": "0001-01-01T00:00:00Z",
            "ID": 7
        })
    }

    #[test]
    fn test_dag_maps_into_snapshot() {
        let wire: WireDag = serde_json::from_value(dag_json()).unwrap();
        let snapshot = JobSnapshot::try_from(wire).unwrap();

        assert_eq!(snapshot.id(), &JobId::from("etl-daily"));
        assert_eq!(snapshot.config.namespace, "default");
        assert_eq!(snapshot.config.schedule, "0 * * * *");
        assert_eq!(snapshot.config.command, vec!["python", "etl.py"]);
        assert_eq!(snapshot.config.retries, 2);
        assert_eq!(snapshot.config.docker_image, "busybox:latest");
        assert!(snapshot.enabled);
        assert_eq!(snapshot.last_updated, None);
        assert_eq!(
            snapshot.most_recent_execution,
            Some(Utc.with_ymd_and_hms(2021, 3, 1, 2, 0, 0).unwrap())
        );

        // Server order is oldest first; the model is most recent first.
        assert_eq!(snapshot.runs[0].name, "etl-daily-2");
        assert!(snapshot.runs[0].is_running());
        assert_eq!(snapshot.runs[1].name, "etl-daily-1");
        assert!(!snapshot.runs[1].is_running());
    }

    #[test]
    fn test_null_collections_become_empty() {
        let wire: WireDag = serde_json::from_value(json!({
            "Config": { "Name": "bare", "Command": null },
            "IsOn": false,
            "DAGRuns": null
        }))
        .unwrap();
        let snapshot = JobSnapshot::try_from(wire).unwrap();

        assert!(snapshot.config.command.is_empty());
        assert!(snapshot.runs.is_empty());
        assert_eq!(snapshot.config.retries, 0);
    }

    #[test]
    fn test_zero_end_time_means_still_running() {
        let wire: WireDagRun = serde_json::from_value(json!({
            "Name": "r",
            "StartTime": "2021-03-01T01:00:00Z",
            "EndTime": "0001-01-01T00:00:00Z",
            "ExecutionDate": "2021-03-01T01:00:00Z"
        }))
        .unwrap();
        assert!(JobRun::from(wire).is_running());
    }

    #[test]
    fn test_invalid_records_are_rejected() {
        let mut value = dag_json();
        value["Config"]["Name"] = json!("");
        let wire: WireDag = serde_json::from_value(value).unwrap();
        assert_eq!(JobSnapshot::try_from(wire), Err(RecordError::EmptyName));

        let mut value = dag_json();
        value["Config"]["Retries"] = json!(-1);
        let wire: WireDag = serde_json::from_value(value).unwrap();
        assert!(matches!(
            JobSnapshot::try_from(wire),
            Err(RecordError::NegativeRetries { retries: -1, .. })
        ));
    }

    #[test]
    fn test_missing_is_on_is_malformed() {
        let mut value = dag_json();
        value.as_object_mut().unwrap().remove("IsOn");
        assert!(serde_json::from_value::<WireDag>(value).is_err());
    }

    #[test]
    fn test_expect_name() {
        let wire: WireDag = serde_json::from_value(dag_json()).unwrap();
        let snapshot = JobSnapshot::try_from(wire).unwrap();

        assert!(expect_name(&JobId::from("etl-daily"), &snapshot).is_ok());
        assert_eq!(
            expect_name(&JobId::from("other"), &snapshot),
            Err(RecordError::NameMismatch {
                expected: JobId::from("other"),
                found: JobId::from("etl-daily"),
            })
        );
    }

    #[test]
    fn test_metric_maps_into_sample() {
        let wire: WireMetric = serde_json::from_value(json!({
            "ID": 3,
            "DagName": "etl-daily",
            "PodName": "etl-daily-2-abcde",
            "Memory": 2048,
            "CPU": 15,
            "MetricTime": "2021-03-01T02:01:00Z"
        }))
        .unwrap();
        let sample = JobMetricSample::from(wire);

        assert_eq!(sample.job, JobId::from("etl-daily"));
        assert_eq!(sample.pod_name, "etl-daily-2-abcde");
        assert_eq!(sample.memory_usage, 2048.0);
        assert_eq!(sample.cpu_usage, 15.0);
    }

    #[test]
    fn test_toggle_body_without_record() {
        let wire: WireToggled = serde_json::from_value(json!({ "IsOn": true })).unwrap();
        assert!(wire.is_on);
        assert_eq!(wire.into_snapshot(), Ok(None));

        let mut value = dag_json();
        value["IsOn"] = json!(false);
        let wire: WireToggled = serde_json::from_value(value).unwrap();
        let snapshot = wire.into_snapshot().unwrap().unwrap();
        assert!(!snapshot.enabled);
        assert_eq!(snapshot.runs.len(), 2);
    }
}
