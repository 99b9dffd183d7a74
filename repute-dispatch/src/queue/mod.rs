//! Dispatch queue: at-least-once delivery of job payloads to the worker pool

mod memory;
pub mod retry;

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use repute_common::{EmailJob, JobStatus};
use repute_store::JobStore;

pub use self::memory::{DeadLetter, MemoryBroker};
use crate::error::{BrokerError, EnqueueError};

/// Task name for email dispatch
pub const EMAIL_SEND: &str = "email:send";

/// A serialized unit of work as carried by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Broker-level identifier, distinct from the job id in the payload
    pub id: String,
    pub name: String,
    pub payload: Arc<[u8]>,
    /// Total number of attempts allowed, including the first
    pub max_attempts: u32,
    /// Number of times this task has been handed to a worker
    pub attempt: u32,
}

impl Task {
    #[must_use]
    pub fn new(name: impl Into<String>, payload: impl Into<Arc<[u8]>>, max_attempts: u32) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: name.into(),
            payload: payload.into(),
            max_attempts,
            attempt: 0,
        }
    }

    /// Whether the retry budget allows another attempt
    #[inline]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// The message broker contract
///
/// Delivery is at-least-once with best-effort FIFO ordering. A task handed
/// out by [`Broker::dequeue`] is owned by the caller until it is passed back
/// through exactly one of [`Broker::retry`], [`Broker::complete`] or
/// [`Broker::dead_letter`].
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    /// Accept a new task
    ///
    /// # Errors
    /// If the broker cannot accept the task
    async fn submit(&self, task: Task) -> Result<(), BrokerError>;

    /// Wait for the next available task
    ///
    /// The returned task has its `attempt` counter incremented. This must be
    /// cancel safe: dropping the future before it resolves loses no task.
    ///
    /// # Errors
    /// If the broker cannot be reached
    async fn dequeue(&self) -> Result<Task, BrokerError>;

    /// Hand a task back for another attempt after `delay`
    ///
    /// # Errors
    /// If the broker cannot be reached
    async fn retry(&self, task: Task, delay: Duration) -> Result<(), BrokerError>;

    /// Acknowledge successful processing
    ///
    /// # Errors
    /// If the broker cannot be reached
    async fn complete(&self, task: Task) -> Result<(), BrokerError>;

    /// Permanently abandon a task
    ///
    /// # Errors
    /// If the broker cannot be reached
    async fn dead_letter(&self, task: Task, reason: String) -> Result<(), BrokerError>;
}

/// Producer side of the dispatch queue
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    jobs: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    max_attempts: u32,
}

impl DispatchQueue {
    #[must_use]
    pub const fn new(jobs: Arc<dyn JobStore>, broker: Arc<dyn Broker>, max_attempts: u32) -> Self {
        Self {
            jobs,
            broker,
            max_attempts,
        }
    }

    /// Persist `job` as queued and submit it for dispatch
    ///
    /// Returns the job id. The job record is written before the task is
    /// submitted, so a submission failure leaves an orphaned `queued` record
    /// behind rather than losing the job.
    ///
    /// # Errors
    /// If the job cannot be serialized, persisted or submitted
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(job_id = %job.id), err)]
    pub async fn enqueue(&self, mut job: EmailJob) -> Result<String, EnqueueError> {
        job.status = JobStatus::Queued;

        let payload = serde_json::to_vec(&job)?;
        self.jobs.save(&job).await.map_err(EnqueueError::Persist)?;

        let task = Task::new(EMAIL_SEND, payload, self.max_attempts);
        tracing::debug!(task_id = %task.id, max_attempts = self.max_attempts, "Submitting job");

        self.broker
            .submit(task)
            .await
            .map_err(|source| EnqueueError::Submit {
                id: job.id.clone(),
                source,
            })?;

        Ok(job.id)
    }

    /// Submit a task for every job the store still holds as `queued`
    ///
    /// Used at startup to pick up jobs whose tasks did not survive a restart.
    /// Jobs that were already in flight may be dispatched twice.
    ///
    /// # Errors
    /// If the store cannot be listed, or a task cannot be submitted
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn resubmit_queued(&self) -> Result<usize, EnqueueError> {
        let queued = self
            .jobs
            .list_queued()
            .await
            .map_err(EnqueueError::Persist)?;

        for job in &queued {
            let task = Task::new(EMAIL_SEND, serde_json::to_vec(job)?, self.max_attempts);
            self.broker
                .submit(task)
                .await
                .map_err(|source| EnqueueError::Submit {
                    id: job.id.clone(),
                    source,
                })?;
        }

        Ok(queued.len())
    }
}
