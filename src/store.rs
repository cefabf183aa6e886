//! Session-wide job state shared by the poller, the toggle controller and the views.
//!
//! Two writers touch the `enabled` flag: poll batches and toggle confirmations.
//! Every write carries a [`WriteTicket`] from one monotonic counter. A poll
//! batch takes its ticket when its request is issued; a toggle takes its ticket
//! when the scheduler confirms it. A batch never overwrites an `enabled` value
//! written under a newer ticket, so a confirmed toggle stays in place until a
//! poll that started after the confirmation replaces it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{debug, trace};

use crate::job::{JobId, JobSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied {
        jobs: usize,
        pruned: usize,
        /// Jobs whose `enabled` flag was kept because a newer toggle wrote it.
        kept_enabled: usize,
    },
    /// A batch issued after this one has already been applied.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Updated,
    Inserted,
    /// Not in the store and no record to insert; the next poll brings it in.
    Unknown,
}

#[derive(Debug)]
struct Entry {
    snapshot: JobSnapshot,
    enabled_written: WriteTicket,
}

#[derive(Debug, Default)]
pub struct JobStateStore {
    jobs: BTreeMap<JobId, Entry>,
    last_ticket: u64,
    last_batch: Option<WriteTicket>,
    revision: u64,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_ticket(&mut self) -> WriteTicket {
        self.last_ticket += 1;
        WriteTicket(self.last_ticket)
    }

    /// Replaces the whole mapping with a freshly fetched set. Jobs missing from
    /// `jobs` are dropped. If the input names a job twice, the later record wins.
    pub fn replace_all(&mut self, ticket: WriteTicket, jobs: Vec<JobSnapshot>) -> ReplaceOutcome {
        if self.last_batch.is_some_and(|last| last > ticket) {
            debug!(?ticket, "Discarding poll batch older than the last applied one");
            return ReplaceOutcome::Stale;
        }

        let mut previous = std::mem::take(&mut self.jobs);
        let mut kept_enabled = 0;
        for mut snapshot in jobs {
            let id = snapshot.id().clone();
            let mut enabled_written = ticket;
            if let Some(old) = previous.remove(&id).or_else(|| self.jobs.remove(&id)) {
                if old.enabled_written > ticket {
                    trace!(job = %id, "Keeping enabled flag written by a newer toggle");
                    snapshot.enabled = old.snapshot.enabled;
                    enabled_written = old.enabled_written;
                    kept_enabled += 1;
                }
            }
            self.jobs.insert(
                id,
                Entry {
                    snapshot,
                    enabled_written,
                },
            );
        }

        self.last_batch = Some(ticket);
        self.revision += 1;
        ReplaceOutcome::Applied {
            jobs: self.jobs.len(),
            pruned: previous.len(),
            kept_enabled,
        }
    }

    /// Targeted update of one job's `enabled` flag after a confirmed toggle.
    /// Returns `false` if the job is not in the store.
    pub fn set_enabled_for_job(&mut self, id: &JobId, enabled: bool) -> bool {
        let ticket = self.issue_ticket();
        let Some(entry) = self.jobs.get_mut(id) else {
            return false;
        };
        entry.snapshot.enabled = enabled;
        entry.enabled_written = ticket;
        self.revision += 1;
        true
    }

    /// Records a confirmed toggle in one step. An existing entry gets its
    /// `enabled` flag overwritten; otherwise `record` is inserted with that flag.
    /// The write takes a fresh ticket, so it also wins over any poll batch
    /// issued before it, whether that batch has landed yet or not.
    pub fn apply_confirmed(
        &mut self,
        id: &JobId,
        enabled: bool,
        record: Option<JobSnapshot>,
    ) -> ConfirmOutcome {
        let ticket = self.issue_ticket();
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.snapshot.enabled = enabled;
            entry.enabled_written = ticket;
            self.revision += 1;
            return ConfirmOutcome::Updated;
        }
        let Some(mut snapshot) = record else {
            return ConfirmOutcome::Unknown;
        };
        snapshot.enabled = enabled;
        self.jobs.insert(
            id.clone(),
            Entry {
                snapshot,
                enabled_written: ticket,
            },
        );
        self.revision += 1;
        ConfirmOutcome::Inserted
    }

    pub fn get(&self, id: &JobId) -> Option<&JobSnapshot> {
        self.jobs.get(id).map(|entry| &entry.snapshot)
    }

    /// All jobs ordered by name.
    pub fn list(&self) -> impl Iterator<Item = &JobSnapshot> {
        self.jobs.values().map(|entry| &entry.snapshot)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Bumped on every applied write.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Cloneable handle to the session's [`JobStateStore`].
///
/// Readers see a `replace_all` either entirely or not at all. Every applied
/// write publishes the new revision to subscribers.
#[derive(Debug, Clone)]
pub struct JobStore {
    inner: Arc<RwLock<JobStateStore>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        JobStore {
            inner: Arc::new(RwLock::new(JobStateStore::new())),
            changes: Arc::new(changes),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn publish(&self, store: &JobStateStore) {
        self.changes.send_if_modified(|revision| {
            let modified = *revision != store.revision();
            *revision = store.revision();
            modified
        });
    }

    pub async fn issue_ticket(&self) -> WriteTicket {
        self.inner.write().await.issue_ticket()
    }

    pub async fn replace_all(&self, ticket: WriteTicket, jobs: Vec<JobSnapshot>) -> ReplaceOutcome {
        let mut store = self.inner.write().await;
        let outcome = store.replace_all(ticket, jobs);
        self.publish(&store);
        outcome
    }

    pub async fn set_enabled_for_job(&self, id: &JobId, enabled: bool) -> bool {
        let mut store = self.inner.write().await;
        let updated = store.set_enabled_for_job(id, enabled);
        self.publish(&store);
        updated
    }

    pub async fn apply_confirmed(
        &self,
        id: &JobId,
        enabled: bool,
        record: Option<JobSnapshot>,
    ) -> ConfirmOutcome {
        let mut store = self.inner.write().await;
        let outcome = store.apply_confirmed(id, enabled, record);
        self.publish(&store);
        outcome
    }

    pub async fn get(&self, id: &JobId) -> Option<JobSnapshot> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.inner.read().await.list().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::snapshot;

    fn names(store: &JobStateStore) -> Vec<String> {
        store.list().map(|job| job.id().to_string()).collect()
    }

    #[test]
    fn test_replace_all_keys_by_identity() {
        let mut store = JobStateStore::new();
        let jobs = vec![
            snapshot("b-job", true, "@daily"),
            snapshot("a-job", false, "@hourly"),
            snapshot("b-job", false, "@weekly"),
        ];

        let ticket = store.issue_ticket();
        let outcome = store.replace_all(ticket, jobs.clone());
        assert_eq!(
            outcome,
            ReplaceOutcome::Applied {
                jobs: 2,
                pruned: 0,
                kept_enabled: 0
            }
        );
        assert_eq!(names(&store), vec!["a-job", "b-job"]);
        assert_eq!(
            store.get(&JobId::from("b-job")).unwrap().config.schedule,
            "@weekly"
        );

        let ticket = store.issue_ticket();
        store.replace_all(ticket, jobs);
        assert_eq!(names(&store), vec!["a-job", "b-job"]);
    }

    #[test]
    fn test_replace_all_prunes_missing_jobs() {
        let mut store = JobStateStore::new();
        let ticket = store.issue_ticket();
        store.replace_all(
            ticket,
            vec![snapshot("a", true, ""), snapshot("b", true, "")],
        );

        let ticket = store.issue_ticket();
        let outcome = store.replace_all(ticket, vec![snapshot("b", false, "")]);
        assert_eq!(
            outcome,
            ReplaceOutcome::Applied {
                jobs: 1,
                pruned: 1,
                kept_enabled: 0
            }
        );
        assert!(store.get(&JobId::from("a")).is_none());
        assert!(!store.get(&JobId::from("b")).unwrap().enabled);
    }

    #[test]
    fn test_toggle_wins_over_older_poll() {
        let mut store = JobStateStore::new();
        let id = JobId::from("etl-daily");
        let first = store.issue_ticket();
        store.replace_all(first, vec![snapshot("etl-daily", false, "0 * * * *")]);

        // Poll issued before the toggle was confirmed.
        let in_flight = store.issue_ticket();
        assert!(store.set_enabled_for_job(&id, true));

        let mut stale = snapshot("etl-daily", false, "*/5 * * * *");
        stale.config.retries = 3;
        let outcome = store.replace_all(in_flight, vec![stale]);
        assert_eq!(
            outcome,
            ReplaceOutcome::Applied {
                jobs: 1,
                pruned: 0,
                kept_enabled: 1
            }
        );
        let job = store.get(&id).unwrap();
        assert!(job.enabled);
        // Everything except the flag still comes from the poll.
        assert_eq!(job.config.schedule, "*/5 * * * *");
        assert_eq!(job.config.retries, 3);

        // A poll started after the confirmation is authoritative again.
        let next = store.issue_ticket();
        store.replace_all(next, vec![snapshot("etl-daily", false, "")]);
        assert!(!store.get(&id).unwrap().enabled);
    }

    #[test]
    fn test_older_batch_is_discarded() {
        let mut store = JobStateStore::new();
        let older = store.issue_ticket();
        let newer = store.issue_ticket();

        store.replace_all(newer, vec![snapshot("a", true, "")]);
        let before = store.revision();
        assert_eq!(
            store.replace_all(older, vec![snapshot("b", true, "")]),
            ReplaceOutcome::Stale
        );
        assert_eq!(names(&store), vec!["a"]);
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn test_set_enabled_leaves_config_and_runs() {
        let mut store = JobStateStore::new();
        let id = JobId::from("a");
        assert!(!store.set_enabled_for_job(&id, true));

        let mut job = snapshot("a", false, "@daily");
        job.runs.push(crate::job::JobRun {
            name: "a-1".to_string(),
            start_time: None,
            end_time: None,
            execution_date: None,
        });
        let ticket = store.issue_ticket();
        store.replace_all(ticket, vec![job.clone()]);

        assert!(store.set_enabled_for_job(&id, true));
        let stored = store.get(&id).unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.config, job.config);
        assert_eq!(stored.runs, job.runs);
    }

    #[test]
    fn test_apply_confirmed_inserts_unknown_jobs() {
        let mut store = JobStateStore::new();
        let id = JobId::from("a");
        assert_eq!(store.apply_confirmed(&id, true, None), ConfirmOutcome::Unknown);
        assert!(store.is_empty());

        assert_eq!(
            store.apply_confirmed(&id, true, Some(snapshot("a", false, "@daily"))),
            ConfirmOutcome::Inserted
        );
        assert!(store.get(&id).unwrap().enabled);
        assert_eq!(store.get(&id).unwrap().config.schedule, "@daily");

        // An in-flight poll that started before the insert keeps its hands off the flag.
        let ticket = WriteTicket(0);
        store.replace_all(ticket, vec![snapshot("a", false, "")]);
        assert!(store.get(&id).unwrap().enabled);
    }

    #[test]
    fn test_confirmation_overrides_older_poll_that_landed_first() {
        let mut store = JobStateStore::new();
        let id = JobId::from("etl-daily");

        // The poll is issued, the toggle is sent for a job the store has not
        // seen, and the poll lands with the pre-command state before the
        // confirmation is recorded.
        let in_flight = store.issue_ticket();
        store.replace_all(in_flight, vec![snapshot("etl-daily", false, "0 * * * *")]);
        assert!(!store.get(&id).unwrap().enabled);

        let outcome = store.apply_confirmed(&id, true, Some(snapshot("etl-daily", true, "")));
        assert_eq!(outcome, ConfirmOutcome::Updated);
        let job = store.get(&id).unwrap();
        assert!(job.enabled);
        assert_eq!(job.config.schedule, "0 * * * *");

        let next = store.issue_ticket();
        store.replace_all(next, vec![snapshot("etl-daily", false, "0 * * * *")]);
        assert!(!store.get(&id).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_shared_store_publishes_revisions() {
        let store = JobStore::new();
        let mut changes = store.subscribe();

        let ticket = store.issue_ticket().await;
        store
            .replace_all(ticket, vec![snapshot("a", false, "")])
            .await;
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);

        assert!(!store.set_enabled_for_job(&JobId::from("zzz"), true).await);
        assert!(!changes.has_changed().unwrap());

        assert!(store.set_enabled_for_job(&JobId::from("a"), true).await);
        assert_eq!(*changes.borrow_and_update(), 2);
        assert_eq!(store.list().await.len(), 1);
        assert!(store.get(&JobId::from("a")).await.unwrap().enabled);
    }
}
