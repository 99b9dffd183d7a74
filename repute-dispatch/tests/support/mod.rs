#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use repute_common::{SenderIdentity, Signal};
use repute_dispatch::{
    Broker, BrokerError, DispatchConfig, DispatchQueue, IdentityConfig, MemoryBroker,
    ReputationManager, RetryPolicy, Task, Transmission, TransmissionGateway, TransmitError,
    WorkerPool,
};
use repute_store::{TestIdentityStore, TestJobStore};
use tokio::{
    sync::{Barrier, Notify, broadcast},
    task::JoinHandle,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn identity(subdomain: &str, ip: &str, health: f64) -> SenderIdentity {
    SenderIdentity {
        health,
        ..SenderIdentity::seeded(subdomain, ip)
    }
}

pub fn config(workers: usize) -> DispatchConfig {
    DispatchConfig {
        workers,
        retry: RetryPolicy::immediate(3),
        ..DispatchConfig::default()
    }
}

/// Records every transmission and optionally fails all of them
#[derive(Debug, Default)]
pub struct RecordingGateway {
    fail: bool,
    sent: Mutex<Vec<Transmission>>,
    attempts: AtomicUsize,
}

impl RecordingGateway {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Transmission> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl TransmissionGateway for RecordingGateway {
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransmitError::Rejected("554 Transaction failed".to_string()));
        }
        self.sent.lock().push(transmission.clone());
        Ok(())
    }
}

/// Holds every send until `parties` sends are in flight at once
#[derive(Debug)]
pub struct BarrierGateway {
    barrier: Barrier,
    sent: Mutex<Vec<Transmission>>,
}

impl BarrierGateway {
    pub fn new(parties: usize) -> Arc<Self> {
        Arc::new(Self {
            barrier: Barrier::new(parties),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Transmission> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl TransmissionGateway for BarrierGateway {
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError> {
        self.barrier.wait().await;
        self.sent.lock().push(transmission.clone());
        Ok(())
    }
}

/// Blocks each send until released, announcing when a send has started
#[derive(Debug, Default)]
pub struct GatedGateway {
    pub entered: Notify,
    pub release: Notify,
    completed: AtomicUsize,
}

#[async_trait]
impl TransmissionGateway for GatedGateway {
    async fn send(&self, _transmission: &Transmission) -> Result<(), TransmitError> {
        let release = self.release.notified();
        self.entered.notify_one();
        release.await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl GatedGateway {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Never answers
#[derive(Debug, Default)]
pub struct StalledGateway;

#[async_trait]
impl TransmissionGateway for StalledGateway {
    async fn send(&self, _transmission: &Transmission) -> Result<(), TransmitError> {
        std::future::pending().await
    }
}

/// A broker that refuses every submission
#[derive(Debug, Default)]
pub struct RejectingBroker;

#[async_trait]
impl Broker for RejectingBroker {
    async fn submit(&self, _task: Task) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("connection refused".to_string()))
    }

    async fn dequeue(&self) -> Result<Task, BrokerError> {
        std::future::pending().await
    }

    async fn retry(&self, _task: Task, _delay: Duration) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("connection refused".to_string()))
    }

    async fn complete(&self, _task: Task) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("connection refused".to_string()))
    }

    async fn dead_letter(&self, _task: Task, _reason: String) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("connection refused".to_string()))
    }
}

/// A full dispatch stack over in-memory test stores
pub struct Harness {
    pub identities: TestIdentityStore,
    pub jobs: TestJobStore,
    pub broker: MemoryBroker,
    pub reputation: Arc<ReputationManager>,
    pub queue: DispatchQueue,
    pub pool: Arc<WorkerPool>,
    shutdown: broadcast::Sender<Signal>,
}

impl Harness {
    pub async fn new(
        identities: Vec<SenderIdentity>,
        gateway: Arc<dyn TransmissionGateway>,
        config: DispatchConfig,
    ) -> Self {
        let identity_store = TestIdentityStore::with_identities(identities);
        let jobs = TestJobStore::new();
        let broker = MemoryBroker::new();

        let seed = IdentityConfig {
            subdomains: Vec::new(),
            ips: Vec::new(),
        };
        let reputation = Arc::new(
            ReputationManager::bootstrap(Arc::new(identity_store.clone()), &seed)
                .await
                .expect("Failed to bootstrap"),
        );

        let queue = DispatchQueue::new(
            Arc::new(jobs.clone()),
            Arc::new(broker.clone()),
            config.retry.max_attempts,
        );
        let pool = Arc::new(WorkerPool::new(
            config,
            Arc::clone(&reputation),
            Arc::new(jobs.clone()),
            Arc::new(broker.clone()),
            gateway,
        ));

        let (shutdown, _) = broadcast::channel(16);

        Self {
            identities: identity_store,
            jobs,
            broker,
            reputation,
            queue,
            pool,
            shutdown,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.pool).serve(self.shutdown.subscribe()))
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.send(Signal::Shutdown).unwrap();
    }

    pub async fn stop(&self, handle: JoinHandle<()>) {
        self.signal_shutdown();
        tokio::time::timeout(WAIT, handle)
            .await
            .expect("Workers did not shut down")
            .expect("Worker pool panicked");
    }
}
