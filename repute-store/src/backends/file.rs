use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use repute_common::{EmailJob, JobStatus, SenderIdentity, internal};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};

use crate::{
    StoreError,
    r#trait::{IdentityStore, JobStore},
};

const IDENTITIES_FILE: &str = "identities.json";
const JOBS_DIR: &str = "jobs";

/// Validate a store root path
///
/// Rejects relative paths and paths containing `..` components.
///
/// # Errors
/// Returns an error if the path is invalid
pub(crate) fn validate_path(path: &Path) -> crate::Result<()> {
    if path
        .components()
        .any(|component| component == std::path::Component::ParentDir)
    {
        return Err(StoreError::InvalidConfiguration(format!(
            "Store path cannot contain '..' components: {}",
            path.display()
        )));
    }

    if !path.is_absolute() {
        return Err(StoreError::InvalidConfiguration(format!(
            "Store path must be absolute: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Create `path` if it is missing, and make sure it is a directory
fn ensure_directory(path: &Path) -> crate::Result<()> {
    if !path.try_exists()? {
        internal!("{} does not exist, creating...", path.display());
        std::fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(std::io::Error::new(
            ErrorKind::NotADirectory,
            format!(
                "Expected {} to be a Directory, but it is not",
                path.display()
            ),
        )
        .into());
    }

    Ok(())
}

/// Serialise `value` to `path` by writing a sibling temp file and renaming it
/// over the target, so readers never observe a partial document
async fn write_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> crate::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;

    Ok(())
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> crate::Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Identity table stored as a single ordered JSON array
///
/// ```text
/// <path>/identities.json
/// ```
///
/// Every upsert rewrites the whole document; the identity table is small (one
/// row per subdomain/IP pair) and order matters for selection tie-breaking.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileIdentityStore {
    /// # Errors
    /// If the path is relative or contains `..`
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create the store directory if needed
    ///
    /// # Errors
    /// If the directory cannot be created or the path is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising identity store at {} ...", self.path.display());
        ensure_directory(&self.path)
    }

    fn file(&self) -> PathBuf {
        self.path.join(IDENTITIES_FILE)
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load_all(&self) -> crate::Result<Vec<SenderIdentity>> {
        Ok(read_document(&self.file()).await?.unwrap_or_default())
    }

    async fn upsert(&self, identity: &SenderIdentity) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut identities: Vec<SenderIdentity> =
            read_document(&self.file()).await?.unwrap_or_default();

        match identities
            .iter_mut()
            .find(|row| row.matches(&identity.subdomain, &identity.ip))
        {
            Some(row) => row.clone_from(identity),
            None => identities.push(identity.clone()),
        }

        write_atomic(&self.file(), &identities).await
    }
}

/// Job records stored as one JSON document per job
///
/// ```text
/// <path>/jobs/<id>.json
/// ```
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileJobStore {
    /// # Errors
    /// If the path is relative or contains `..`
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create the job directory if needed
    ///
    /// # Errors
    /// If the directory cannot be created or the path is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising job store at {} ...", self.path.display());
        ensure_directory(&self.path.join(JOBS_DIR))
    }

    /// Map a job id onto its document path
    ///
    /// Job ids become filenames, so anything that could escape the jobs
    /// directory is rejected.
    fn file(&self, id: &str) -> crate::Result<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(StoreError::InvalidConfiguration(format!(
                "Invalid job id: {id:?}"
            )));
        }

        Ok(self.path.join(JOBS_DIR).join(format!("{id}.json")))
    }

    async fn modify(&self, id: &str, f: impl FnOnce(&mut EmailJob) + Send) -> crate::Result<()> {
        let path = self.file(id)?;
        let _guard = self.write_lock.lock().await;

        let mut job: EmailJob = read_document(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(&mut job);

        write_atomic(&path, &job).await
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, job: &EmailJob) -> crate::Result<()> {
        let path = self.file(&job.id)?;
        let _guard = self.write_lock.lock().await;

        write_atomic(&path, job).await
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> crate::Result<()> {
        self.modify(id, |job| job.status = status).await
    }

    async fn record_assignment(&self, id: &str, subdomain: &str, ip: &str) -> crate::Result<()> {
        self.modify(id, |job| {
            job.assigned_subdomain = subdomain.to_string();
            job.assigned_ip = ip.to_string();
        })
        .await
    }

    async fn get(&self, id: &str) -> crate::Result<EmailJob> {
        read_document(&self.file(id)?)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_queued(&self) -> crate::Result<Vec<EmailJob>> {
        let mut entries = fs::read_dir(self.path.join(JOBS_DIR)).await?;
        let mut queued = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Skips in-progress temp files too, which end in `.json.tmp`
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            if let Some(job) = read_document::<EmailJob>(&path).await?
                && job.status == JobStatus::Queued
            {
                queued.push(job);
            }
        }

        queued.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        let result = FileIdentityStore::new("relative/path");

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must be absolute")
        );
    }

    #[test]
    fn rejects_parent_components() {
        let result = FileJobStore::new("/var/lib/../etc");

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot contain '..'"));
    }

    #[test]
    fn rejects_job_ids_that_escape_the_directory() {
        let store = FileJobStore::new("/var/lib/repute").unwrap();

        for id in ["", "../identities", "a/b", "a\\b"] {
            assert!(store.file(id).is_err(), "Job id {id:?} should be rejected");
        }
        assert!(store.file("01ARZ3NDEKTSV4RRFFQ69G5FAV").is_ok());
    }
}
