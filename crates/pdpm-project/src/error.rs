use pdpm_core::ManifestError;
use pdpm_installer::EnvError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Environment(#[from] EnvError),
}

/// How the command boundary should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Bad input or a missing precondition: report it and exit cleanly.
    Graceful,
    /// A side effect failed: the command exits non-zero.
    Failed,
    /// The whole process must terminate immediately with non-zero status.
    Fatal,
}

impl ProjectError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Manifest(err) if err.is_validation() => Disposition::Graceful,
            Self::Manifest(_) => Disposition::Failed,
            Self::Environment(EnvError::NotFound { .. }) => Disposition::Fatal,
            Self::Environment(
                EnvError::NoEnvironment
                | EnvError::InvalidState { .. }
                | EnvError::InvalidName { .. },
            ) => Disposition::Graceful,
            Self::Environment(_) => Disposition::Failed,
        }
    }
}
