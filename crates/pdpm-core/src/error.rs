use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating packages or writing project files.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize lock snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': expected 'latest' or a plain version such as 1.2.3")]
    InvalidVersion(String),
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for bad user input, as opposed to a failed side effect.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidName(..) | Self::InvalidVersion(_))
    }
}
