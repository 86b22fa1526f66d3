use std::fs;
use std::path::{Path, PathBuf};

use crate::ManifestError;

/// Writes `contents` to a `.part` sibling and renames it over `path`.
///
/// A failed write removes the part file and leaves any previous `path` intact.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ManifestError::io(parent, err))?;
    }

    let part_path = part_path_for(path);
    if let Err(err) = fs::write(&part_path, contents) {
        let _ = fs::remove_file(&part_path);
        return Err(ManifestError::io(path, err));
    }

    if let Err(err) = fs::rename(&part_path, path) {
        let _ = fs::remove_file(&part_path);
        return Err(ManifestError::io(path, err));
    }

    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

pub(crate) fn part_path_for(path: &Path) -> PathBuf {
    path.with_file_name(format!(
        "{}.part",
        path.file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("pdpm")
    ))
}
