//! Periodic housekeeping: registry retention sweep, link-cache compaction,
//! and session grace-period expiry, run once a minute via
//! `tokio-cron-scheduler` (§9 design note: a cron job rather than a bespoke
//! `tokio::time::interval` loop, matching how the teacher schedules its own
//! periodic refresh).

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::info;

use crate::cache::LinkCache;
use crate::job::registry::JobRegistry;
use crate::session::SessionArbiter;

pub struct Housekeeping {
    registry: Arc<JobRegistry>,
    link_cache: Arc<LinkCache>,
    sessions: Arc<SessionArbiter>,
}

impl Housekeeping {
    pub fn new(registry: Arc<JobRegistry>, link_cache: Arc<LinkCache>, sessions: Arc<SessionArbiter>) -> Self {
        Housekeeping { registry, link_cache, sessions }
    }

    /// Builds and starts a scheduler running the sweep every minute. The
    /// returned `JobScheduler` must be kept alive for the sweep to keep firing.
    pub async fn spawn(self) -> Result<JobScheduler, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let registry = self.registry;
        let link_cache = self.link_cache;
        let sessions = self.sessions;

        let job = Job::new("0 * * * * *", move |_uuid, _locked| {
            registry.sweep_retention();
            link_cache.compact();
            sessions.sweep_expired();
            info!("housekeeping sweep complete");
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        Ok(scheduler)
    }
}
