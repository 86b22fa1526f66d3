use std::io;
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{context}: command failed to start ({program}): {source}")]
    Spawn {
        context: String,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: status={status} stdout='{stdout}' stderr='{stderr}'")]
    Failed {
        context: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// Runs an external command to completion and checks its exit status.
///
/// Closures with the same shape implement this, which is how tests observe
/// spawned commands without running them.
pub trait CommandRunner {
    fn run(&mut self, command: &mut Command, context: &str) -> Result<(), ProcessError>;
}

impl<F> CommandRunner for F
where
    F: FnMut(&mut Command, &str) -> Result<(), ProcessError>,
{
    fn run(&mut self, command: &mut Command, context: &str) -> Result<(), ProcessError> {
        self(command, context)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &mut Command, context: &str) -> Result<(), ProcessError> {
        run_command(command, context)
    }
}

pub fn run_command(command: &mut Command, context: &str) -> Result<(), ProcessError> {
    tracing::debug!(?command, "spawning");
    let output = command.output().map_err(|source| ProcessError::Spawn {
        context: context.to_string(),
        program: command.get_program().to_string_lossy().into_owned(),
        source,
    })?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(ProcessError::Failed {
        context: context.to_string(),
        status: output.status.to_string(),
        stdout: stdout.trim().to_string(),
        stderr: stderr.trim().to_string(),
    })
}
