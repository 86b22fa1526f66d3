use std::path::PathBuf;

use crate::fs_utils::write_atomic;
use crate::{ManifestError, PackageSet, ProjectMetadata};

pub const MANIFEST_FILE_NAME: &str = "pyproject.toml";

/// Write-only store for the project manifest; nothing reads it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Replaces the whole manifest with `metadata` and `packages`.
    pub fn save(
        &self,
        metadata: Option<&ProjectMetadata>,
        packages: &PackageSet,
    ) -> Result<(), ManifestError> {
        let payload = render_manifest(metadata, packages);
        write_atomic(&self.path, payload.as_bytes())?;
        tracing::info!(
            path = %self.path.display(),
            packages = packages.len(),
            "saved manifest"
        );
        Ok(())
    }
}

pub fn render_manifest(metadata: Option<&ProjectMetadata>, packages: &PackageSet) -> String {
    let mut payload = String::from("[project]\n");
    if let Some(metadata) = metadata {
        for (key, value) in metadata.entries() {
            payload.push_str(&format!("{} = {}\n", toml_key(key), toml_value(value)));
        }
    }
    payload.push_str("\n[packages]\n");
    for (name, version) in packages.iter() {
        payload.push_str(&format!(
            "{} = {}\n",
            toml_key(name),
            toml_value(version.as_str())
        ));
    }
    payload
}

fn toml_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if bare {
        key.to_string()
    } else {
        basic_string(key)
    }
}

// Literal strings cannot hold a single quote or control characters.
fn toml_value(value: &str) -> String {
    if value.contains('\'') || value.chars().any(char::is_control) {
        basic_string(value)
    } else {
        format!("'{value}'")
    }
}

fn basic_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
