//! Periodic full refresh of the job store, tied to the lifetime of a mounted view.

use thiserror::Error;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::client::{ClientError, JobApi, SharedJobApi};
use crate::config::PollingConfig;
use crate::store::{JobStore, ReplaceOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollerError {
    #[error("Poller is already running")]
    AlreadyRunning,

    #[error("Poller has been stopped and cannot be restarted")]
    Stopped,
}

#[derive(Debug)]
pub enum TickOutcome {
    Applied(ReplaceOutcome),
    Failed(ClientError),
    /// The poller was cancelled while the request was in flight; nothing was written.
    Cancelled,
}

struct RunningPoll {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Poller {
    client: SharedJobApi,
    store: JobStore,
    config: PollingConfig,
    state: PollerState,
    running: Option<RunningPoll>,
}

impl Poller {
    pub fn new(client: SharedJobApi, store: JobStore, config: PollingConfig) -> Self {
        Poller {
            client,
            store,
            config,
            state: PollerState::Idle,
            running: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Spawns the poll loop. The first tick fires immediately.
    #[instrument("poller/start", skip(self), fields(interval = ?self.config.interval()))]
    pub fn start(&mut self) -> Result<(), PollerError> {
        match self.state {
            PollerState::Running => return Err(PollerError::AlreadyRunning),
            PollerState::Stopped => return Err(PollerError::Stopped),
            PollerState::Idle => {}
        }

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(
            poll_loop(
                self.client.clone(),
                self.store.clone(),
                self.config.clone(),
                cancelled,
            )
            .instrument(info_span!("poller")),
        );
        self.running = Some(RunningPoll { cancel, task });
        self.state = PollerState::Running;
        info!("Poller started.");
        Ok(())
    }

    /// Cancels the loop but allows a later [`Poller::start`].
    pub async fn pause(&mut self) {
        self.halt().await;
        if self.state == PollerState::Running {
            self.state = PollerState::Idle;
        }
    }

    /// Cancels the loop for good. Once this returns, no tick fires and no
    /// response still in flight is written to the store.
    pub async fn stop(&mut self) {
        self.halt().await;
        self.state = PollerState::Stopped;
        info!("Poller stopped.");
    }

    async fn halt(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.cancel.send(true);
        if let Err(e) = running.task.await {
            if e.is_panic() {
                error!("Poll loop panicked: {e}");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.cancel.send(true);
            running.task.abort();
        }
    }
}

async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    // A dropped sender counts as cancellation too.
    let _ = cancelled.wait_for(|cancelled| *cancelled).await;
}

#[instrument("poll_tick", skip_all, level = "debug")]
async fn tick(
    client: &dyn JobApi,
    store: &JobStore,
    cancelled: &mut watch::Receiver<bool>,
) -> TickOutcome {
    let ticket = store.issue_ticket().await;
    let result = select! {
        biased;
        _ = wait_cancelled(cancelled) => return TickOutcome::Cancelled,
        result = client.list_jobs() => result,
    };

    let jobs = match result {
        Ok(jobs) => jobs,
        Err(e) => return TickOutcome::Failed(e),
    };
    if *cancelled.borrow() {
        return TickOutcome::Cancelled;
    }
    TickOutcome::Applied(store.replace_all(ticket, jobs).await)
}

/// Runs a single refresh outside of any poll loop.
pub async fn poll_once(client: &dyn JobApi, store: &JobStore) -> TickOutcome {
    let (_cancel, mut cancelled) = watch::channel(false);
    tick(client, store, &mut cancelled).await
}

async fn poll_loop(
    client: SharedJobApi,
    store: JobStore,
    config: PollingConfig,
    mut cancelled: watch::Receiver<bool>,
) {
    if !config.initial_wait().is_zero() {
        select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => return,
            _ = time::sleep(config.initial_wait()) => {}
        }
    }

    let mut ticker = time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u64;

    loop {
        select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => break,
            _ = ticker.tick() => {}
        }

        match tick(client.as_ref(), &store, &mut cancelled).await {
            TickOutcome::Applied(outcome) => {
                if failures > 0 {
                    info!("Polling recovered after {failures} failed tick(s).");
                }
                failures = 0;
                debug!(?outcome, "Poll tick applied.");
            }
            TickOutcome::Failed(e) => {
                failures += 1;
                if failures >= config.error_report_threshold() {
                    error!("Poll tick failed ({failures} in a row), keeping previous state: {e}");
                } else {
                    warn!("Poll tick failed, keeping previous state: {e}");
                }
            }
            TickOutcome::Cancelled => {
                debug!("Poller cancelled with a request in flight; response discarded.");
                break;
            }
        }
    }
}
