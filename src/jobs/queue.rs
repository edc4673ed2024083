use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::{Job, JobQueue};

const PENDING_KEY: &str = "jobs:pending";
const ACTIVE_KEY: &str = "jobs:active";

/// Queue-internal wrapper. Jobs themselves carry no retry state; the
/// envelope tracks how often this delivery has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    id: Uuid,
    attempts: u32,
    #[serde(flatten)]
    job: Job,
}

/// One reserved job. Holds the raw list entry so the exact string can be
/// acked out of the active list again.
pub struct Delivery {
    raw: String,
    envelope: Envelope,
}

impl Delivery {
    pub fn job(&self) -> &Job {
        &self.envelope.job
    }

    pub fn attempts(&self) -> u32 {
        self.envelope.attempts
    }
}

/// Redis-list-backed job queue with at-least-once delivery.
///
/// `LPUSH jobs:pending` enqueues; the worker moves entries to
/// `jobs:active` with `BRPOPLPUSH` and removes them after the handler
/// returns. A crash mid-run leaves the entry in the active list, from
/// where `recover_abandoned` re-queues it at the next worker start.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    max_attempts: u32,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, max_attempts: u32) -> Self {
        Self {
            conn,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Move everything a dead worker left in the active list back to
    /// pending. Call once before the poll loop starts.
    pub async fn recover_abandoned(&self) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let mut moved = 0u64;
        loop {
            let entry: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(ACTIVE_KEY)
                .arg(PENDING_KEY)
                .query_async(&mut conn)
                .await?;
            if entry.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Block up to `timeout_secs` for the next job. `None` means the
    /// timeout elapsed with nothing queued.
    pub async fn reserve(&self, timeout_secs: u64) -> Result<Option<Delivery>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(PENDING_KEY)
            .arg(ACTIVE_KEY)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => Ok(Some(Delivery { raw, envelope })),
            Err(e) => {
                // Poison entry: drop it or the worker would spin on it.
                tracing::error!(error = %e, "unreadable job entry dropped");
                self.remove_active(&raw).await?;
                Ok(None)
            }
        }
    }

    /// Acknowledge a finished delivery.
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), AppError> {
        self.remove_active(&delivery.raw).await
    }

    /// Re-queue a failed delivery with its attempt count bumped, until
    /// the cap is reached; after that the job is dropped with a warning.
    pub async fn retry(&self, delivery: Delivery) -> Result<(), AppError> {
        self.remove_active(&delivery.raw).await?;

        let mut envelope = delivery.envelope;
        envelope.attempts += 1;
        if envelope.attempts >= self.max_attempts {
            tracing::warn!(
                job_id = %envelope.id,
                task = envelope.job.task_name(),
                attempts = envelope.attempts,
                "job abandoned after repeated failures"
            );
            return Ok(());
        }

        let raw = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(e.into()))?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(PENDING_KEY, raw).await?;
        Ok(())
    }

    async fn remove_active(&self, raw: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("LREM")
            .arg(ACTIVE_KEY)
            .arg(1)
            .arg(raw)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> Result<(), AppError> {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            attempts: 0,
            job,
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(PENDING_KEY, raw).await?;
        tracing::debug!(job_id = %envelope.id, task = envelope.job.task_name(), "job queued");
        Ok(())
    }
}

/// In-process FIFO queue. Backs the test harness and lets the binary run
/// without Redis; callers drain it explicitly.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued job, oldest first.
    pub fn drain(&self) -> Vec<Job> {
        let mut guard = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), AppError> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(job);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::DeleteProfilePicture;

    fn delete_job(id: &str) -> Job {
        Job::DeleteProfilePicture(DeleteProfilePicture {
            file_id: id.into(),
        })
    }

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryQueue::new();
        queue.enqueue(delete_job("a")).await.unwrap();
        queue.enqueue(delete_job("b")).await.unwrap();

        let drained = queue.drain();
        assert_eq!(drained, vec![delete_job("a"), delete_job("b")]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_runs_nothing() {
        let queue = MemoryQueue::new();
        queue.enqueue(delete_job("x")).await.unwrap();
        // the job sits in the queue untouched until someone drains it
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            attempts: 2,
            job: delete_job("p/x.png"),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["attempts"], 2);
        assert_eq!(value["task"], "deleteProfilePicture");
        assert_eq!(value["data"]["file_id"], "p/x.png");

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back.job, envelope.job);
    }
}
