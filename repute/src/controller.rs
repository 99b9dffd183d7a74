use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use repute_common::{Signal, internal};
use repute_dispatch::{
    DispatchConfig, DispatchQueue, IdentityConfig, LogGateway, MemoryBroker, ReputationManager,
    TimeoutGateway, TransmissionGateway, WorkerPool,
};
use repute_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::telemetry::MetricsConfig;

/// Which transmission gateway the workers send through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum GatewayConfig {
    /// Log every message and report success (dry run)
    #[default]
    Log,
}

impl GatewayConfig {
    fn build(self, dispatch: &DispatchConfig) -> Arc<dyn TransmissionGateway> {
        match self {
            Self::Log => Arc::new(TimeoutGateway::new(LogGateway, dispatch.transmit_timeout())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Repute {
    #[serde(default)]
    identities: IdentityConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    gateway: GatewayConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

/// Everything the dispatch loop needs, wired together
#[derive(Debug)]
pub struct Dispatcher {
    pub reputation: Arc<ReputationManager>,
    pub queue: DispatchQueue,
    pub broker: MemoryBroker,
    pub pool: Arc<WorkerPool>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for SIGINT or SIGTERM
#[tracing::instrument(level = tracing::Level::TRACE)]
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Tell the workers to stop and wait for the jobs they hold
///
/// `force` resolving, or `grace` elapsing, abandons whatever is still in
/// flight. Those jobs are still `queued` in the store and are resubmitted on
/// the next start.
async fn drain(
    shutdown: &broadcast::Sender<Signal>,
    serve: impl Future<Output = ()> + Send,
    force: impl Future + Send,
    grace: Duration,
) -> anyhow::Result<()> {
    shutdown
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::select! {
        () = serve => {
            internal!(level = INFO, "All in-flight jobs settled");
            Ok(())
        }
        _ = force => {
            anyhow::bail!("Shutdown forced with jobs still in flight")
        }
        () = tokio::time::sleep(grace) => {
            anyhow::bail!("Workers did not settle within {grace:?}, remaining jobs will be resubmitted on restart")
        }
    }
}

impl Repute {
    pub const fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    /// One line describing the identity grid, worker count and store
    pub fn summary(&self) -> String {
        let store = self
            .store
            .path()
            .map_or_else(|| "memory".to_string(), |p| p.display().to_string());

        format!(
            "{} subdomains x {} IPs, {} workers, {} attempts per job, store {store}",
            self.identities.subdomains.len(),
            self.identities.ips.len(),
            self.dispatch.workers,
            self.dispatch.retry.max_attempts,
        )
    }

    /// Build the stores, load the sender identities and wire up the workers
    ///
    /// Jobs the store still holds as queued are resubmitted.
    ///
    /// # Errors
    ///
    /// This function will return an error if the stores cannot be opened, or
    /// the sender identities cannot be loaded or seeded.
    pub async fn assemble(self) -> anyhow::Result<Dispatcher> {
        let (identity_store, job_store) = self.store.build()?;

        let reputation =
            Arc::new(ReputationManager::bootstrap(identity_store, &self.identities).await?);

        let broker = MemoryBroker::new();
        let queue = DispatchQueue::new(
            Arc::clone(&job_store),
            Arc::new(broker.clone()),
            self.dispatch.retry.max_attempts,
        );

        let resubmitted = queue.resubmit_queued().await?;
        if resubmitted > 0 {
            internal!(level = INFO, "Resubmitted {resubmitted} queued jobs");
        }

        let gateway = self.gateway.build(&self.dispatch);
        let pool = Arc::new(WorkerPool::new(
            self.dispatch,
            Arc::clone(&reputation),
            job_store,
            Arc::new(broker.clone()),
            gateway,
        ));

        Ok(Dispatcher {
            reputation,
            queue,
            broker,
            pool,
        })
    }

    /// Run the dispatch loop until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// This function will return an error if the dispatcher cannot be
    /// assembled, the shutdown signal handlers cannot be installed, or the
    /// workers do not settle once asked to stop.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        let provider = self.metrics.install()?;
        let grace = self.dispatch.drain_timeout();

        let dispatcher = self.assemble().await?;

        let identities = dispatcher.reputation.identities().await.len();
        internal!(
            level = INFO,
            "Dispatching with {} workers over {identities} sender identities",
            dispatcher.pool.config().workers
        );

        let serve = Arc::clone(&dispatcher.pool).serve(SHUTDOWN_BROADCAST.subscribe());
        tokio::pin!(serve);

        let signalled = tokio::select! {
            () = &mut serve => Ok(false),
            r = wait_for_signal() => r.map(|()| true),
        };

        let ret = match signalled {
            Ok(true) => {
                drain(&SHUTDOWN_BROADCAST, &mut serve, tokio::signal::ctrl_c(), grace).await
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        internal!("Shutting down...");

        let pending = dispatcher.broker.pending_len() + dispatcher.broker.scheduled_len();
        if pending > 0 {
            tracing::warn!("{pending} tasks were still queued and will be resubmitted on restart");
        }

        let totals = dispatcher.pool.metrics().snapshot();
        internal!(
            level = INFO,
            "Sent {}, failed attempts {}, retried {}, dead-lettered {}",
            totals.sent_emails_total,
            totals.failed_attempts_total,
            totals.retried_total,
            totals.dead_lettered_total
        );

        if let Some(provider) = provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!("Failed to flush metrics: {e}");
        }

        ret
    }
}
