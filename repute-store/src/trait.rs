use async_trait::async_trait;
use repute_common::{EmailJob, JobStatus, SenderIdentity};

/// Durable table of sender identities, keyed uniquely by (subdomain, ip)
#[async_trait]
pub trait IdentityStore: Send + Sync + std::fmt::Debug {
    /// Load every identity, in the order they were first stored
    ///
    /// # Errors
    /// If the store cannot be read
    async fn load_all(&self) -> crate::Result<Vec<SenderIdentity>>;

    /// Insert the identity, or replace the row with the same (subdomain, ip)
    ///
    /// # Errors
    /// If the store cannot be written
    async fn upsert(&self, identity: &SenderIdentity) -> crate::Result<()>;
}

/// Durable record of email jobs and their status
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Persist a job, replacing any existing record with the same id
    ///
    /// # Errors
    /// If the store cannot be written
    async fn save(&self, job: &EmailJob) -> crate::Result<()>;

    /// Set the status of an existing job
    ///
    /// # Errors
    /// If the job does not exist or the store cannot be written
    async fn update_status(&self, id: &str, status: JobStatus) -> crate::Result<()>;

    /// Record the identity a job was dispatched through
    ///
    /// # Errors
    /// If the job does not exist or the store cannot be written
    async fn record_assignment(&self, id: &str, subdomain: &str, ip: &str) -> crate::Result<()>;

    /// Read a job back
    ///
    /// # Errors
    /// If the job does not exist or the store cannot be read
    async fn get(&self, id: &str) -> crate::Result<EmailJob>;

    /// Every job still waiting to be sent, ordered by id
    ///
    /// # Errors
    /// If the store cannot be read
    async fn list_queued(&self) -> crate::Result<Vec<EmailJob>>;
}
