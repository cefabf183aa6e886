use chrono::{DateTime, Utc};
use tokio::select;
use tracing::{info, instrument};

use super::{on_off, table, timestamp};
use crate::client::SharedJobApi;
use crate::config::PollingConfig;
use crate::job::JobSnapshot;
use crate::poller::{Poller, PollerError};
use crate::shutdown::Shutdown;
use crate::store::JobStore;

pub fn render_list(jobs: &[JobSnapshot], updated: DateTime<Utc>) -> String {
    let mut table = table(vec![
        "Status",
        "Namespace",
        "Schedule",
        "Name",
        "Last Run Time",
    ]);
    for job in jobs {
        table.add_row(vec![
            on_off(job.enabled).to_string(),
            job.config.namespace.clone(),
            job.config.schedule.clone(),
            job.config.name.to_string(),
            timestamp(job.last_run_time()),
        ]);
    }
    format!(
        "My DAGs ({} total, updated {})\n{table}",
        jobs.len(),
        timestamp(Some(updated))
    )
}

/// Mounts the list page: polls while mounted and re-renders on every store
/// change. Unmounts when `shutdown` fires.
#[instrument("list_view", skip_all)]
pub async fn run_list_view(
    client: SharedJobApi,
    store: JobStore,
    polling: PollingConfig,
    shutdown: &mut Shutdown,
) -> Result<(), PollerError> {
    let mut changes = store.subscribe();
    let mut poller = Poller::new(client, store.clone(), polling);
    poller.start()?;

    loop {
        select! {
            signal = shutdown.wait() => {
                info!("Received {signal}. Unmounting list view...");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let jobs = store.list().await;
                println!("{}", render_list(&jobs, Utc::now()));
            }
        }
    }

    poller.stop().await;
    Ok(())
}
