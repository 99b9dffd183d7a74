use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use repute_common::{EmailJob, JobStatus, SenderIdentity};

use crate::{
    StoreError,
    r#trait::{IdentityStore, JobStore},
};

/// In-memory identity table
///
/// Rows are kept in a `Vec` so that [`IdentityStore::load_all`] returns them in
/// first-insertion order; an upsert of an existing key replaces it in place.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    pub(crate) identities: Arc<RwLock<Vec<SenderIdentity>>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given rows
    #[must_use]
    pub fn with_identities(identities: Vec<SenderIdentity>) -> Self {
        Self {
            identities: Arc::new(RwLock::new(identities)),
        }
    }

    /// Get the current number of rows
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load_all(&self) -> crate::Result<Vec<SenderIdentity>> {
        Ok(self.identities.read()?.clone())
    }

    async fn upsert(&self, identity: &SenderIdentity) -> crate::Result<()> {
        let mut identities = self.identities.write()?;

        match identities
            .iter_mut()
            .find(|row| row.matches(&identity.subdomain, &identity.ip))
        {
            Some(row) => row.clone_from(identity),
            None => identities.push(identity.clone()),
        }

        Ok(())
    }
}

/// In-memory job records, keyed by job id
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    pub(crate) jobs: Arc<RwLock<HashMap<String, EmailJob>>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut EmailJob)) -> crate::Result<()> {
        self.jobs
            .write()?
            .get_mut(id)
            .map(f)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, job: &EmailJob) -> crate::Result<()> {
        self.jobs.write()?.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> crate::Result<()> {
        self.modify(id, |job| job.status = status)
    }

    async fn record_assignment(&self, id: &str, subdomain: &str, ip: &str) -> crate::Result<()> {
        self.modify(id, |job| {
            job.assigned_subdomain = subdomain.to_string();
            job.assigned_ip = ip.to_string();
        })
    }

    async fn get(&self, id: &str) -> crate::Result<EmailJob> {
        self.jobs
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_queued(&self) -> crate::Result<Vec<EmailJob>> {
        let mut queued: Vec<EmailJob> = self
            .jobs
            .read()?
            .values()
            .filter(|job| job.status == JobStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(queued)
    }
}
