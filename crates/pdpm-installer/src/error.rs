use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{EnvState, InstallReport, ProcessError};

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("virtual environment '{name}' does not exist (missing {})", descriptor.display())]
    NotFound { name: String, descriptor: PathBuf },

    #[error("invalid environment name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("unsupported platform: '{0}'")]
    UnsupportedPlatform(String),

    #[error("no virtual environment; please create a virtual environment first")]
    NoEnvironment,

    #[error("cannot {operation} environment '{name}' while it is {state}")]
    InvalidState {
        operation: &'static str,
        name: String,
        state: EnvState,
    },

    #[error("failed to {operation} environment '{name}': {source}")]
    Operation {
        operation: &'static str,
        name: String,
        #[source]
        source: ProcessError,
    },

    #[error("{0}")]
    Install(InstallReport),

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
