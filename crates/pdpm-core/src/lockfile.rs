use std::path::PathBuf;

use crate::fs_utils::write_atomic;
use crate::{ManifestError, PackageSet};

pub const LOCK_FILE_NAME: &str = "pdpm.lock";

/// Snapshots the package set into `pdpm.lock`.
///
/// The lock is an explicit checkpoint: it is never refreshed when the package
/// set changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn lock(&self, packages: &PackageSet) -> Result<PathBuf, ManifestError> {
        let payload = render_lock(packages)?;
        write_atomic(&self.path, payload.as_bytes())?;
        tracing::info!(
            path = %self.path.display(),
            packages = packages.len(),
            "wrote lock snapshot"
        );
        Ok(self.path.clone())
    }
}

/// Key-ordered JSON object of name to version token.
pub fn render_lock(packages: &PackageSet) -> Result<String, ManifestError> {
    let mut payload = serde_json::to_string_pretty(packages)?;
    payload.push('\n');
    Ok(payload)
}
