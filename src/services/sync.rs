//! External user-synchronization seam.
//!
//! Sync jobs are started from an external link (`sync_run=start&job_id=…`).
//! Two backends exist: a push backend that writes local users to the
//! directory, and a queue backend that drains a prepared job. Which ones are
//! installed is decided at wiring time; the dispatcher only sees `Option`s.

use async_trait::async_trait;

/// A configured synchronization job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait UserSyncService: Send + Sync {
    /// Look up a job by id. The queue backend validates existence before a
    /// run is started; an unknown id aborts with a log entry only.
    async fn get_job(&self, job_id: &str) -> Option<SyncJob>;

    /// Run the job to completion. Invoked fire-and-forget; the triggering
    /// request never awaits the result.
    async fn run(&self, job_id: &str);
}
