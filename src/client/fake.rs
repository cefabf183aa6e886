//! Scripted in-memory scheduler for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::{ClientError, ClientFuture, JobApi, ToggleConfirmation};
use crate::job::{JobConfig, JobId, JobMetricSample, JobRun, JobSnapshot};

#[derive(Default)]
pub(crate) struct FakeJobApi {
    jobs: Mutex<BTreeMap<JobId, JobSnapshot>>,
    metrics: Mutex<BTreeMap<JobId, Vec<JobMetricSample>>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    toggle_gates: Mutex<VecDeque<Arc<Notify>>>,
    fail_list: AtomicBool,
    fail_get: AtomicBool,
    fail_toggle: AtomicBool,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
    toggle_calls: AtomicUsize,
}

pub(crate) fn snapshot(name: &str, enabled: bool, schedule: &str) -> JobSnapshot {
    JobSnapshot {
        config: JobConfig {
            schedule: schedule.to_string(),
            namespace: "default".to_string(),
            ..JobConfig::placeholder(JobId::from(name))
        },
        enabled,
        runs: Vec::new(),
        most_recent_execution: None,
        last_updated: None,
    }
}

fn unavailable(path: String) -> ClientError {
    ClientError::Status {
        url: format!("fake://scheduler{path}"),
        status: 503,
        body: "scripted failure".to_string(),
    }
}

impl FakeJobApi {
    pub(crate) fn with_jobs(jobs: impl IntoIterator<Item = JobSnapshot>) -> Arc<Self> {
        let fake = FakeJobApi::default();
        for job in jobs {
            fake.put_job(job);
        }
        Arc::new(fake)
    }

    /// Changes the server-side record, as another client or the scheduler would.
    pub(crate) fn put_job(&self, job: JobSnapshot) {
        self.jobs.lock().unwrap().insert(job.id().clone(), job);
    }

    pub(crate) fn remove_job(&self, id: &JobId) {
        self.jobs.lock().unwrap().remove(id);
    }

    pub(crate) fn put_metrics(&self, id: JobId, samples: Vec<JobMetricSample>) {
        self.metrics.lock().unwrap().insert(id, samples);
    }

    /// Holds every subsequent `list_jobs` response until the returned handle is
    /// notified. The response content is still read when the request is issued.
    pub(crate) fn gate_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn ungate_list(&self) {
        self.list_gate.lock().unwrap().take();
    }

    /// Holds the response of the next not-yet-gated `set_enabled` call until
    /// the returned handle is notified. The server-side flip still happens when
    /// the request is issued. Each call consumes one gate, in order.
    pub(crate) fn gate_toggle(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.toggle_gates.lock().unwrap().push_back(gate.clone());
        gate
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_toggle(&self, fail: bool) {
        self.fail_toggle.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn toggle_calls(&self) -> usize {
        self.toggle_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        self.jobs.lock().unwrap().get(id).cloned().ok_or_else(|| {
            ClientError::Status {
                url: format!("fake://scheduler/dag/{id}"),
                status: 404,
                body: "\"There is no DAG with given name\"".to_string(),
            }
        })
    }
}

impl JobApi for FakeJobApi {
    fn list_jobs(&self) -> ClientFuture<'_, Vec<JobSnapshot>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let response = if self.fail_list.load(Ordering::SeqCst) {
            Err(unavailable("/dags".to_string()))
        } else {
            Ok(self.jobs.lock().unwrap().values().cloned().collect())
        };
        let gate = self.list_gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            response
        })
    }

    fn get_job<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, JobSnapshot> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let response = if self.fail_get.load(Ordering::SeqCst) {
            Err(unavailable(format!("/dag/{id}")))
        } else {
            self.lookup(id)
        };
        Box::pin(async move { response })
    }

    fn get_job_runs<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobRun>> {
        let response = if self.fail_get.load(Ordering::SeqCst) {
            Err(unavailable(format!("/dag/{id}/runs")))
        } else {
            self.lookup(id).map(|job| job.runs)
        };
        Box::pin(async move { response })
    }

    fn get_job_metrics<'a>(&'a self, id: &'a JobId) -> ClientFuture<'a, Vec<JobMetricSample>> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        let samples = self
            .metrics
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(samples) })
    }

    fn set_enabled<'a>(
        &'a self,
        id: &'a JobId,
        _desired: bool,
    ) -> ClientFuture<'a, ToggleConfirmation> {
        self.toggle_calls.fetch_add(1, Ordering::SeqCst);
        let response = if self.fail_toggle.load(Ordering::SeqCst) {
            Err(unavailable(format!("/dag/{id}/toggle")))
        } else {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) => {
                    job.enabled = !job.enabled;
                    Ok(ToggleConfirmation {
                        id: id.clone(),
                        enabled: job.enabled,
                        snapshot: Some(job.clone()),
                    })
                }
                None => Err(unavailable(format!("/dag/{id}/toggle"))),
            }
        };
        let gate = self.toggle_gates.lock().unwrap().pop_front();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            response
        })
    }
}
