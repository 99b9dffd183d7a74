//! Worker pool running the dispatch loop

mod dispatch;

use std::{sync::Arc, time::Duration};

use repute_common::{JobStatus, Signal, internal};
use repute_store::JobStore;
use serde::Deserialize;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinSet,
};
use tracing::Instrument;

use crate::{
    error::DispatchError,
    gateway::TransmissionGateway,
    metrics::DispatchMetrics,
    queue::{Broker, Task, retry::RetryPolicy},
    reputation::ReputationManager,
};

/// Pause before asking an unreachable broker again
const BROKER_BACKOFF: Duration = Duration::from_millis(500);

const fn default_workers() -> usize {
    10
}

fn default_local_part() -> String {
    String::from("sender")
}

const fn default_failure_penalty_rate() -> f64 {
    0.2
}

const fn default_transmit_timeout_secs() -> u64 {
    30
}

const fn default_drain_timeout_secs() -> u64 {
    30
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispatchConfig {
    /// Number of concurrent workers
    ///
    /// Default: 10
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Local part of the sender address, `<local_part>@<subdomain>`
    ///
    /// Default: `sender`
    #[serde(default = "default_local_part")]
    pub local_part: String,

    /// Spam and bounce rate reported against an identity when a send fails
    ///
    /// Default: 0.2
    #[serde(default = "default_failure_penalty_rate")]
    pub failure_penalty_rate: f64,

    /// Upper bound on a single send (in seconds)
    ///
    /// Default: 30
    #[serde(default = "default_transmit_timeout_secs")]
    pub transmit_timeout_secs: u64,

    /// How long a shutdown waits for in-flight jobs (in seconds)
    ///
    /// Default: 30
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            local_part: default_local_part(),
            failure_penalty_rate: default_failure_penalty_rate(),
            transmit_timeout_secs: default_transmit_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn transmit_timeout(&self) -> Duration {
        Duration::from_secs(self.transmit_timeout_secs)
    }

    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// A fixed number of workers pulling tasks from a [`Broker`]
///
/// Each worker takes one task at a time and processes it to completion
/// before asking for the next.
#[derive(Debug)]
pub struct WorkerPool {
    config: DispatchConfig,
    reputation: Arc<ReputationManager>,
    jobs: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    gateway: Arc<dyn TransmissionGateway>,
    metrics: Arc<DispatchMetrics>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        reputation: Arc<ReputationManager>,
        jobs: Arc<dyn JobStore>,
        broker: Arc<dyn Broker>,
        gateway: Arc<dyn TransmissionGateway>,
    ) -> Self {
        Self {
            config,
            reputation,
            jobs,
            broker,
            gateway,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the workers until a shutdown signal is received
    ///
    /// ## Graceful Shutdown
    ///
    /// On [`Signal::Shutdown`] every worker stops taking new tasks. A task
    /// that is already being processed runs to completion, and this returns
    /// once every worker has exited.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(workers = self.config.workers))]
    pub async fn serve(self: Arc<Self>, shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            "Starting {} dispatch workers",
            self.config.workers
        );

        let mut workers = JoinSet::new();
        for worker in 0..self.config.workers.max(1) {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.resubscribe();
            workers.spawn(
                pool.run_worker(shutdown)
                    .instrument(tracing::debug_span!("worker", worker)),
            );
        }
        drop(shutdown);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Dispatch worker panicked: {e}");
            }
        }

        internal!(level = INFO, "Dispatch workers shutdown complete");
    }

    async fn run_worker(self: Arc<Self>, mut shutdown: broadcast::Receiver<Signal>) {
        loop {
            let next = tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) | Err(RecvError::Closed) => {
                            tracing::debug!("Worker received shutdown signal");
                            break;
                        }
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
                next = self.broker.dequeue() => next,
            };

            match next {
                Ok(task) => self.handle(task).await,
                Err(e) => {
                    tracing::error!("Failed to dequeue task: {e}");
                    tokio::time::sleep(BROKER_BACKOFF).await;
                }
            }
        }
    }

    /// Process one task and settle it with the broker
    async fn handle(&self, task: Task) {
        let result = self.dispatch(&task).await;

        let settled = match result {
            Ok(()) => self.broker.complete(task).await,
            Err(error) => self.settle_failure(task, &error).await,
        };

        if let Err(e) = settled {
            tracing::error!("Failed to settle task with the broker: {e}");
        }
    }

    async fn settle_failure(
        &self,
        task: Task,
        error: &DispatchError,
    ) -> Result<(), crate::error::BrokerError> {
        if error.is_retryable() && task.has_attempts_left() {
            let delay = self.config.retry.delay_after(task.attempt);
            tracing::warn!(
                task_id = %task.id,
                attempt = task.attempt,
                max_attempts = task.max_attempts,
                ?delay,
                "Dispatch failed, retrying: {error}"
            );
            self.metrics.record_retry();
            self.broker.retry(task, delay).await
        } else {
            tracing::error!(
                task_id = %task.id,
                attempt = task.attempt,
                max_attempts = task.max_attempts,
                "Dispatch failed permanently: {error}"
            );
            self.metrics.record_dead_letter();
            self.mark_failed(&task).await;
            self.broker.dead_letter(task, error.to_string()).await
        }
    }
}

/// The part of a job payload needed to find its record
#[derive(Deserialize)]
struct JobRef {
    id: String,
}

impl WorkerPool {
    /// Record a dead-lettered job as `failed` so startup recovery skips it
    ///
    /// Payloads that do not carry a job id have no record to update.
    async fn mark_failed(&self, task: &Task) {
        let Ok(JobRef { id }) = serde_json::from_slice(&task.payload) else {
            return;
        };

        if let Err(e) = self.jobs.update_status(&id, JobStatus::Failed).await {
            tracing::warn!(job_id = %id, "Failed to mark dead-lettered job as failed: {e}");
        }
    }
}
