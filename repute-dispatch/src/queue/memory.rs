use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Broker, Task};
use crate::error::BrokerError;

/// A task that exhausted its retry budget or failed permanently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub task: Task,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<VecDeque<Task>>,
    dead: Mutex<Vec<DeadLetter>>,
    completed: AtomicUsize,
    /// Number of retries waiting out their delay
    scheduled: AtomicUsize,
    available: Notify,
    settled: Notify,
}

impl Inner {
    fn push(&self, task: Task) {
        self.pending.lock().push_back(task);
        self.available.notify_one();
    }
}

/// In-process broker
///
/// Pending tasks live in a FIFO queue; delayed retries are parked on a timer
/// task and re-enter the back of the queue when it fires.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks ready to be dequeued
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of retries waiting for their delay to elapse
    pub fn scheduled_len(&self) -> usize {
        self.inner.scheduled.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead.lock().clone()
    }

    /// Wait until at least `expected` tasks have been dead-lettered
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_dead_letters(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<DeadLetter>, BrokerError> {
        self.wait_until(timeout, || self.inner.dead.lock().len() >= expected)
            .await?;
        Ok(self.dead_letters())
    }

    /// Wait until at least `expected` tasks have completed
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_completed(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.wait_until(timeout, || self.completed_count() >= expected)
            .await
    }

    async fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn() -> bool + Send + Sync,
    ) -> Result<(), BrokerError> {
        tokio::time::timeout(timeout, async {
            loop {
                let settled = self.inner.settled.notified();
                if done() {
                    return;
                }
                settled.await;
            }
        })
        .await
        .map_err(|e| BrokerError::Unavailable(format!("Timeout waiting for tasks to settle: {e}")))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn submit(&self, task: Task) -> Result<(), BrokerError> {
        self.inner.push(task);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Task, BrokerError> {
        loop {
            if let Some(mut task) = self.inner.pending.lock().pop_front() {
                task.attempt += 1;
                return Ok(task);
            }
            self.inner.available.notified().await;
        }
    }

    async fn retry(&self, task: Task, delay: Duration) -> Result<(), BrokerError> {
        if delay.is_zero() {
            self.inner.push(task);
            return Ok(());
        }

        self.inner.scheduled.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.scheduled.fetch_sub(1, Ordering::SeqCst);
            inner.push(task);
        });

        Ok(())
    }

    async fn complete(&self, _task: Task) -> Result<(), BrokerError> {
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        self.inner.settled.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, task: Task, reason: String) -> Result<(), BrokerError> {
        self.inner.dead.lock().push(DeadLetter { task, reason });
        self.inner.settled.notify_waiters();
        Ok(())
    }
}
