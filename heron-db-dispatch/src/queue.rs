//! Job-queue collaborator seam
//!
//! The async leg of dispatch hands serialized impacted-subject messages to
//! a queue. Enqueuing blocks only until the message is durably queued,
//! never until the work completes.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Background job-queue transport
#[async_trait]
pub trait JobQueue: Debug + Send + Sync {
    /// Durably enqueue a job payload, returning a tracking token
    async fn enqueue(&self, payload: Value, queue_name: &str) -> Result<String>;
}

/// Queued job held by [`MemoryJobQueue`]
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Tracking token returned to the enqueuer
    pub token: String,
    /// Queue the job was submitted to
    pub queue_name: String,
    /// Serialized payload
    pub payload: Value,
}

/// In-memory job queue for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<Vec<QueuedJob>>>,
}

impl MemoryJobQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every enqueued job, in submission order
    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.lock().clone()
    }

    /// Number of enqueued jobs
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, payload: Value, queue_name: &str) -> Result<String> {
        let token = uuid::Uuid::new_v4().to_string();
        self.jobs.lock().push(QueuedJob {
            token: token.clone(),
            queue_name: queue_name.to_string(),
            payload,
        });
        Ok(token)
    }
}
