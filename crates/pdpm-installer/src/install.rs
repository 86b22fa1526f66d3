use std::fmt;
use std::path::Path;
use std::process::Command;

use pdpm_core::{PackageSet, PackageSpec};

use crate::{
    CommandRunner, EnvError, EnvState, EnvironmentOrchestrator, ProcessError, VirtualEnvironment,
};

#[derive(Debug)]
pub struct InstallFailure {
    pub spec: PackageSpec,
    pub error: ProcessError,
}

/// Outcome of one `install` run. Every package is attempted.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub environment: String,
    pub installed: Vec<PackageSpec>,
    pub failed: Vec<InstallFailure>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.installed.len() + self.failed.len()
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .failed
            .iter()
            .map(|failure| failure.spec.specifier())
            .collect::<Vec<_>>();
        write!(
            f,
            "failed to install {} of {} package(s) into '{}': {}",
            self.failed.len(),
            self.attempted(),
            self.environment,
            names.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent<'a> {
    Reprovisioned { total: usize },
    Started { spec: &'a PackageSpec },
    Finished { spec: &'a PackageSpec, ok: bool },
}

/// Re-provisions `environment` and installs every package into it.
///
/// A failed package does not stop the run; failures are collected and
/// returned as [`EnvError::Install`] once every package has been attempted.
pub fn install_packages<R, P>(
    orchestrator: &mut EnvironmentOrchestrator<R>,
    packages: &PackageSet,
    environment: Option<&mut VirtualEnvironment>,
    mut on_event: P,
) -> Result<InstallReport, EnvError>
where
    R: CommandRunner,
    P: FnMut(InstallEvent<'_>),
{
    let Some(env) = environment else {
        return Err(EnvError::NoEnvironment);
    };
    if !matches!(env.state(), EnvState::Created | EnvState::Active) {
        return Err(EnvError::InvalidState {
            operation: "install into",
            name: env.name().to_string(),
            state: env.state(),
        });
    }

    orchestrator.recreate(env)?;
    let specs = packages.specs();
    on_event(InstallEvent::Reprovisioned { total: specs.len() });

    let cache_dir = orchestrator.layout().package_cache_dir();
    let mut report = InstallReport {
        environment: env.name().to_string(),
        ..InstallReport::default()
    };
    for spec in &specs {
        on_event(InstallEvent::Started { spec });
        let mut command = build_install_command(env, spec, &cache_dir);
        let context = format!("pip install {} failed", spec.specifier());
        match orchestrator.runner_mut().run(&mut command, &context) {
            Ok(()) => {
                tracing::debug!(package = %spec, "installed");
                on_event(InstallEvent::Finished { spec, ok: true });
                report.installed.push(spec.clone());
            }
            Err(error) => {
                tracing::warn!(package = %spec, %error, "install failed");
                on_event(InstallEvent::Finished { spec, ok: false });
                report.failed.push(InstallFailure {
                    spec: spec.clone(),
                    error,
                });
            }
        }
    }

    if report.is_success() {
        Ok(report)
    } else {
        Err(EnvError::Install(report))
    }
}

pub fn build_install_command(
    env: &VirtualEnvironment,
    spec: &PackageSpec,
    cache_dir: &Path,
) -> Command {
    let interpreter = env
        .overlay()
        .map(|overlay| overlay.interpreter.clone())
        .unwrap_or_else(|| env.python_path());
    let mut command = Command::new(interpreter);
    command
        .arg("-m")
        .arg("pip")
        .arg("install")
        .arg("--cache-dir")
        .arg(cache_dir)
        .arg(spec.specifier());
    env.apply_overlay(&mut command);
    command
}
