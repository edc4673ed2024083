//! Background worker: drains the Redis job queue.
//!
//! One runner per process is enough; Redis hands each entry to exactly
//! one `BRPOPLPUSH` caller, so extra workers scale out without
//! coordination.

use std::time::Duration;

use crate::jobs::handlers::{dispatch, JobContext};
use crate::jobs::queue::RedisQueue;

const RESERVE_TIMEOUT_SECS: u64 = 5;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct JobRunner {
    queue: RedisQueue,
    ctx: JobContext,
}

impl JobRunner {
    pub fn new(queue: RedisQueue, ctx: JobContext) -> Self {
        Self { queue, ctx }
    }

    /// Spawn the worker loop alongside the server. Call this once at
    /// startup.
    pub fn spawn(self) {
        tokio::spawn(async move {
            self.run().await;
        });
    }

    /// Drive the worker loop on the current task. Used by the dedicated
    /// worker process; never returns.
    pub async fn run(self) {
        match self.queue.recover_abandoned().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(jobs = n, "re-queued jobs abandoned by a previous worker"),
            Err(e) => tracing::error!("failed to recover abandoned jobs: {}", e),
        }

        tracing::info!("job worker started");
        loop {
            let delivery = match self.queue.reserve(RESERVE_TIMEOUT_SECS).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("job queue poll failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let task = delivery.job().task_name();
            match dispatch(&self.ctx, delivery.job()).await {
                Ok(()) => {
                    if let Err(e) = self.queue.ack(&delivery).await {
                        tracing::error!(task, "failed to ack finished job: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!(task, attempt = delivery.attempts() + 1, "job failed: {:#}", e);
                    if let Err(e) = self.queue.retry(delivery).await {
                        tracing::error!(task, "failed to re-queue job: {}", e);
                    }
                }
            }
        }
    }
}
