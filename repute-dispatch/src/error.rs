//! Typed error handling for the dispatch loop.
//!
//! Every per-job failure is reduced to one of the [`DispatchError`] kinds,
//! which decides between retrying the job and dead-lettering it.

use std::time::Duration;

use repute_common::IdentityKey;
use repute_store::StoreError;
use thiserror::Error;

/// Errors raised by the reputation manager.
#[derive(Debug, Error)]
pub enum ReputationError {
    /// The identity store could not be read or seeded at construction.
    #[error("Failed to bootstrap sender identities: {0}")]
    Bootstrap(#[source] StoreError),

    /// An updated identity could not be written back.
    ///
    /// The in-memory row has already been updated when this is returned.
    #[error("Failed to persist sender identity {key}: {source}")]
    Persistence {
        key: IdentityKey,
        #[source]
        source: StoreError,
    },
}

/// Failures reported by a transmission gateway.
///
/// All of these are transient from the scheduler's point of view.
#[derive(Debug, Error)]
pub enum TransmitError {
    /// The remote side refused the message.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The remote side could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The send did not complete in time.
    #[error("Transmission timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a failed dispatch attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed job payload or unknown task. Never retried.
    #[error("Invalid job payload: {0}")]
    Validation(String),

    /// No sender identity is available. Never retried.
    #[error("No sender identity available")]
    ResourceExhausted,

    /// The transmission gateway failed. Retried up to the budget.
    #[error("Transmission failed: {0}")]
    Transient(#[from] TransmitError),

    /// An identity or job store write failed. Retried up to the budget.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl DispatchError {
    /// Returns `true` if the job should be handed back to the queue.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Persistence(_))
    }
}

impl From<ReputationError> for DispatchError {
    fn from(error: ReputationError) -> Self {
        match error {
            ReputationError::Bootstrap(source) | ReputationError::Persistence { source, .. } => {
                Self::Persistence(source)
            }
        }
    }
}

/// Errors raised by a broker implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker cannot be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while enqueueing a job.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The job could not be encoded as a task payload.
    #[error("Failed to serialize job: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The job record could not be written to the job store.
    #[error("Failed to persist job: {0}")]
    Persist(#[source] StoreError),

    /// The job record exists, but the broker did not accept the task.
    #[error("Failed to submit job {id}: {source}")]
    Submit {
        id: String,
        #[source]
        source: BrokerError,
    },
}
