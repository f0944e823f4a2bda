use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentrun_storage::{Job, JsonMap, NewJob, StorageGateway};
use uuid::Uuid;

use crate::error::{AppError, ErrorContext};

/// Soft cap on queued jobs. Enqueues above this fail fast with
/// `QueueFull` rather than growing the table unboundedly under load.
const DEFAULT_HIGH_WATER_MARK: i64 = 10_000;

pub struct JobQueue {
    storage: StorageGateway,
    high_water_mark: i64,
    backoff_base_secs: u64,
    backoff_cap_secs: u64,
    in_flight: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn new(storage: StorageGateway, backoff_base_secs: u64) -> Self {
        Self {
            storage,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            backoff_base_secs,
            backoff_cap_secs: backoff_base_secs.saturating_mul(64),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn enqueue(
        &self,
        agent_id: Option<Uuid>,
        session_id: Option<Uuid>,
        job_type: &str,
        priority: i32,
        payload: JsonMap,
        max_retries: i32,
    ) -> Result<Job, AppError> {
        let queued_depth = self.storage.count_queued_jobs().await?;
        if queued_depth >= self.high_water_mark {
            return Err(AppError::QueueFull(ErrorContext::new("job queue high-water mark reached")));
        }
        let job = self
            .storage
            .enqueue_job(NewJob {
                agent_id,
                session_id,
                job_type: job_type.to_string(),
                priority,
                payload,
                max_retries,
            })
            .await?;
        Ok(job)
    }

    pub async fn claim(&self) -> Result<Option<Job>, AppError> {
        let job = self.storage.claim_job().await?;
        if job.is_some() {
            self.in_flight.fetch_add(1, Ordering::Relaxed);
        }
        Ok(job)
    }

    pub async fn complete(&self, id: Uuid, result: JsonMap) -> Result<(), AppError> {
        self.storage.complete_job(id, result).await?;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn fail(&self, id: Uuid, error_message: &str, retriable: bool) -> Result<Job, AppError> {
        let job = self
            .storage
            .fail_job(id, error_message, retriable, self.backoff_base_secs, self.backoff_cap_secs)
            .await?;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        Ok(job)
    }

    /// Reclaims jobs a crashed worker left `running` past the stuck
    /// threshold.
    pub async fn sweep_stuck(&self, stuck_threshold_secs: u64) -> Result<u64, AppError> {
        Ok(self.storage.sweep_stuck_jobs(stuck_threshold_secs).await?)
    }
}

/// Runs the fixed-interval poll loop: claim, hand off to `handler`,
/// complete/fail. Exits when `shutdown` resolves.
pub async fn run_worker<F, Fut>(
    queue: Arc<JobQueue>,
    poll_interval: Duration,
    handler: F,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<JsonMap, String>> + Send,
{
    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }
        match queue.claim().await {
            Ok(Some(job)) => {
                let id = job.id;
                match handler(job).await {
                    Ok(result) => {
                        if let Err(e) = queue.complete(id, result).await {
                            tracing::warn!(error = %e, job_id = %id, "failed to mark job complete");
                        }
                    }
                    Err(message) => {
                        if let Err(e) = queue.fail(id, &message, true).await {
                            tracing::warn!(error = %e, job_id = %id, "failed to mark job failed");
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "job claim failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_cap_is_a_multiple_of_base() {
        let base = 2u64;
        let cap = base.saturating_mul(64);
        assert_eq!(cap, 128);
    }
}
