mod error;
mod fs_utils;
mod lockfile;
mod manifest;
mod package;

pub use error::ManifestError;
pub use lockfile::{render_lock, LockManager, LOCK_FILE_NAME};
pub use manifest::{render_manifest, ManifestStore, MANIFEST_FILE_NAME};
pub use package::{
    validate_package_name, PackageSet, PackageSpec, ProjectMetadata, VersionToken, LATEST,
};
