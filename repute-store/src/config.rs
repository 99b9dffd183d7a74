use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    FileIdentityStore, FileJobStore, MemoryIdentityStore, MemoryJobStore,
    r#trait::{IdentityStore, JobStore},
};

/// Runtime selection of the identity and job store implementation
///
/// File-backed stores in RON config:
/// ```ron
/// Repute (
///     store: File(
///         path: "/var/lib/repute",
///     ),
/// )
/// ```
///
/// Memory-backed stores for development:
/// ```ron
/// Repute (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StoreConfig {
    /// JSON documents under `path` (production)
    File { path: PathBuf },
    /// Process-local maps, lost on restart
    #[default]
    Memory,
}

impl StoreConfig {
    /// Construct and initialise both stores
    ///
    /// # Errors
    /// If the configured location is invalid or cannot be created
    pub fn build(&self) -> crate::Result<(Arc<dyn IdentityStore>, Arc<dyn JobStore>)> {
        match self {
            Self::File { path } => {
                let identities = FileIdentityStore::new(path.clone())?;
                identities.init()?;
                let jobs = FileJobStore::new(path.clone())?;
                jobs.init()?;

                Ok((Arc::new(identities), Arc::new(jobs)))
            }
            Self::Memory => Ok((
                Arc::new(MemoryIdentityStore::new()),
                Arc::new(MemoryJobStore::new()),
            )),
        }
    }

    /// Get the filesystem path for file-backed stores, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }
}
