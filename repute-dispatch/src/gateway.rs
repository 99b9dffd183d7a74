//! The seam between the dispatch loop and whatever actually sends mail

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use repute_common::{EmailJob, outgoing};

use crate::error::TransmitError;

/// A message addressed from a chosen sender identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Transmission {
    /// Address `job` from `<local_part>@<assigned subdomain>`
    #[must_use]
    pub fn for_job(job: &EmailJob, local_part: &str) -> Self {
        Self {
            from: format!("{local_part}@{}", job.assigned_subdomain),
            to: job.recipient.clone(),
            subject: job.subject.clone(),
            html: job.html.clone(),
        }
    }
}

/// Sends a [`Transmission`]
///
/// Any error returned here is treated as transient by the worker pool.
#[async_trait]
pub trait TransmissionGateway: Send + Sync + Debug {
    /// # Errors
    /// If the message could not be handed off
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError>;
}

#[async_trait]
impl<T: TransmissionGateway + ?Sized> TransmissionGateway for Arc<T> {
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError> {
        (**self).send(transmission).await
    }
}

/// Bounds every send of the wrapped gateway
#[derive(Debug)]
pub struct TimeoutGateway<G> {
    inner: G,
    timeout: Duration,
}

impl<G> TimeoutGateway<G> {
    pub const fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<G: TransmissionGateway> TransmissionGateway for TimeoutGateway<G> {
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError> {
        tokio::time::timeout(self.timeout, self.inner.send(transmission))
            .await
            .map_err(|_| TransmitError::Timeout(self.timeout))?
    }
}

/// A gateway that only logs what it would have sent
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

#[async_trait]
impl TransmissionGateway for LogGateway {
    async fn send(&self, transmission: &Transmission) -> Result<(), TransmitError> {
        outgoing!(
            level = INFO,
            "Sending '{}' from {} to {}",
            transmission.subject,
            transmission.from,
            transmission.to
        );
        Ok(())
    }
}
