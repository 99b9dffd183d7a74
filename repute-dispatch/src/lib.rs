//! Sender reputation scheduler and dispatch loop
//!
//! This crate provides:
//! - [`ReputationManager`]: the health-ranked working set of sender identities
//! - [`DispatchQueue`] and the [`Broker`] contract: at-least-once job delivery with a retry budget
//! - [`WorkerPool`]: N concurrent workers running the per-job dispatch state machine
//! - [`TransmissionGateway`]: the seam to whatever actually sends the mail

mod error;
mod gateway;
mod metrics;
pub mod queue;
pub mod reputation;
mod worker;

pub use error::{BrokerError, DispatchError, EnqueueError, ReputationError, TransmitError};
pub use gateway::{LogGateway, TimeoutGateway, Transmission, TransmissionGateway};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use queue::{
    Broker, DeadLetter, DispatchQueue, EMAIL_SEND, MemoryBroker, Task,
    retry::{RetryPolicy, calculate_retry_delay},
};
pub use reputation::{IdentityConfig, Rates, ReputationManager};
pub use worker::{DispatchConfig, WorkerPool};
