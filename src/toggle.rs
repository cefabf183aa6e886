use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use tracing_error::{ExtractSpanTrace, SpanTrace};

use crate::client::{ClientError, SharedJobApi};
use crate::error::{SpannedErr, SpannedExt};
use crate::job::JobId;
use crate::store::{ConfirmOutcome, JobStore};

#[derive(Error, Debug)]
pub enum ToggleError {
    #[error("Could not read the current state of job '{0}': {1}")]
    Lookup(JobId, SpannedErr<ClientError>),

    #[error("Toggle command for job '{0}' failed: {1}")]
    Command(JobId, SpannedErr<ClientError>),
}

impl ExtractSpanTrace for ToggleError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            ToggleError::Lookup(_, e) => e.span_trace(),
            ToggleError::Command(_, e) => e.span_trace(),
        }
    }
}

/// Issues enable/disable commands and records confirmed results in the store.
///
/// Two toggles of the same job may race; whichever confirmation is applied
/// last decides the stored value.
#[derive(Clone)]
pub struct ToggleController {
    client: SharedJobApi,
    store: JobStore,
}

impl ToggleController {
    pub fn new(client: SharedJobApi, store: JobStore) -> Self {
        ToggleController { client, store }
    }

    /// Flips the job's enabled flag and resolves with the state the scheduler
    /// confirmed. On failure the store is left untouched; reverting any
    /// optimistic display is up to the caller.
    #[instrument("toggle", skip(self), fields(job = %id))]
    pub async fn toggle(&self, id: &JobId) -> Result<bool, ToggleError> {
        let (current, fetched) = match self.store.get(id).await {
            Some(snapshot) => (snapshot.enabled, None),
            None => {
                debug!("Job not in store yet, fetching it.");
                let snapshot = self
                    .client
                    .get_job(id)
                    .await
                    .with_span_trace()
                    .map_err(|e| ToggleError::Lookup(id.clone(), e))?;
                (snapshot.enabled, Some(snapshot))
            }
        };

        let desired = !current;
        let confirmation = self
            .client
            .set_enabled(id, desired)
            .await
            .with_span_trace()
            .map_err(|e| ToggleError::Command(id.clone(), e))?;

        if confirmation.enabled != desired {
            warn!(
                desired,
                confirmed = confirmation.enabled,
                "Scheduler confirmed a different state than requested."
            );
        }

        let record = confirmation.snapshot.or(fetched);
        let outcome = self
            .store
            .apply_confirmed(id, confirmation.enabled, record)
            .await;
        if outcome == ConfirmOutcome::Unknown {
            debug!("No record to insert; the next poll will pick the job up.");
        }

        info!(enabled = confirmation.enabled, "Toggle confirmed.");
        Ok(confirmation.enabled)
    }
}
