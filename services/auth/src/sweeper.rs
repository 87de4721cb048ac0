//! Background compaction of expired session rows
//!
//! Validation already sweeps on every call; this job only keeps the table
//! small between requests.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::AuthResult;
use crate::repositories::SessionStore;

/// Delete every expired session row once
pub async fn sweep_once(sessions: &dyn SessionStore, clock: &dyn Clock) -> AuthResult<u64> {
    let removed = sessions.sweep_expired(clock.now()).await?;
    Ok(removed)
}

/// Run [`sweep_once`] on a cron schedule
///
/// The returned scheduler owns the job; keep it alive for as long as the
/// sweeps should run.
pub async fn start_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_, _| {
        let sessions = sessions.clone();
        let clock = clock.clone();
        Box::pin(async move {
            match sweep_once(sessions.as_ref(), clock.as_ref()).await {
                Ok(removed) => info!("Session sweep removed {} expired rows", removed),
                Err(e) => error!("Session sweep failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Started session sweeper with schedule: {}", schedule);
    Ok(scheduler)
}
