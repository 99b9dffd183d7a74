//! Locating and reading the RON configuration

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::controller::Repute;

/// Searched in order when no path is given explicitly
pub const DEFAULT_PATHS: [&str; 2] = ["./repute.config.ron", "/etc/repute/repute.config.ron"];

/// Resolve the configuration file
///
/// An explicit path (from `--config` or `REPUTE_CONFIG`) must exist. Without
/// one, the first of `candidates` that exists wins.
///
/// # Errors
///
/// If the explicit path does not exist, or no candidate does
pub fn locate<P: AsRef<Path>>(
    explicit: Option<PathBuf>,
    candidates: &[P],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(
            path.exists(),
            "Configuration file {} does not exist",
            path.display()
        );
        return Ok(path);
    }

    if let Some(found) = candidates.iter().map(AsRef::<Path>::as_ref).find(|p| p.exists()) {
        return Ok(found.to_path_buf());
    }

    let tried = candidates
        .iter()
        .map(|p| format!("  - {}", p.as_ref().display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!("No configuration file found. Tried:\n{tried}")
}

impl Repute {
    /// Parse the configuration at `path`
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a valid configuration
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }
}
