use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{validate_env_name, CommandRunner, EnvError, Platform, ProjectLayout, SystemRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Absent,
    Created,
    Active,
    Inactive,
}

impl EnvState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EnvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variables an activated environment contributes to child
/// processes. Never applied to the running process itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOverlay {
    pub virtual_env: PathBuf,
    pub path: OsString,
    pub interpreter: PathBuf,
}

impl ActivationOverlay {
    pub fn apply(&self, command: &mut Command) {
        command
            .env("VIRTUAL_ENV", &self.virtual_env)
            .env("PATH", &self.path)
            .env_remove("PYTHONHOME");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnvironment {
    name: String,
    root: PathBuf,
    interpreter: String,
    platform: Platform,
    state: EnvState,
    overlay: Option<ActivationOverlay>,
}

impl VirtualEnvironment {
    pub fn new(layout: &ProjectLayout, name: &str, interpreter: &str, platform: Platform) -> Self {
        Self {
            name: name.to_string(),
            root: layout.env_dir(name),
            interpreter: interpreter.to_string(),
            platform,
            state: EnvState::Absent,
            overlay: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn overlay(&self) -> Option<&ActivationOverlay> {
        self.overlay.as_ref()
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(self.platform.scripts_dir_name())
    }

    /// Interpreter inside the environment.
    pub fn python_path(&self) -> PathBuf {
        self.scripts_dir().join(self.platform.python_file_name())
    }

    pub fn activation_descriptor(&self) -> PathBuf {
        self.scripts_dir()
            .join(self.platform.activation_descriptor_name())
    }

    pub fn deactivation_entry(&self) -> PathBuf {
        self.scripts_dir().join("deactivate.bat")
    }

    /// Applies the activation overlay, if any, to a child command.
    pub fn apply_overlay(&self, command: &mut Command) {
        if let Some(overlay) = &self.overlay {
            overlay.apply(command);
        }
    }
}

/// Drives the `Absent -> Created -> Active -> Inactive` lifecycle.
#[derive(Debug)]
pub struct EnvironmentOrchestrator<R = SystemRunner> {
    layout: ProjectLayout,
    platform: Platform,
    runner: R,
    base_path: Option<OsString>,
}

impl<R: CommandRunner> EnvironmentOrchestrator<R> {
    pub fn new(layout: ProjectLayout, platform: Platform, runner: R) -> Self {
        Self {
            layout,
            platform,
            runner,
            base_path: None,
        }
    }

    /// Overrides the `PATH` that activation prepends to. Defaults to the
    /// process `PATH` at activation time.
    pub fn with_base_path(mut self, base_path: impl Into<OsString>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    pub fn create(
        &mut self,
        interpreter: &str,
        name: &str,
    ) -> Result<VirtualEnvironment, EnvError> {
        validate_env_name(name)?;
        let mut env = VirtualEnvironment::new(&self.layout, name, interpreter, self.platform);
        self.provision(&mut env, "create")?;
        if self.platform == Platform::Windows {
            self.activate(&mut env)?;
        }
        Ok(env)
    }

    /// Re-runs provisioning for an existing handle. Activation survives.
    pub fn recreate(&mut self, env: &mut VirtualEnvironment) -> Result<(), EnvError> {
        let was_active = env.state == EnvState::Active;
        self.provision(env, "re-create")?;
        if was_active || self.platform == Platform::Windows {
            self.activate(env)?;
        }
        Ok(())
    }

    fn provision(
        &mut self,
        env: &mut VirtualEnvironment,
        operation: &'static str,
    ) -> Result<(), EnvError> {
        let mut command = build_create_command(&env.interpreter, &env.root);
        self.runner
            .run(&mut command, "python -m venv failed")
            .map_err(|source| EnvError::Operation {
                operation,
                name: env.name.clone(),
                source,
            })?;
        env.state = EnvState::Created;
        env.overlay = None;
        tracing::info!(env = %env.name, root = %env.root.display(), "environment created");
        Ok(())
    }

    pub fn activate(&self, env: &mut VirtualEnvironment) -> Result<(), EnvError> {
        let descriptor = env.activation_descriptor();
        if !descriptor.is_file() {
            return Err(EnvError::NotFound {
                name: env.name.clone(),
                descriptor,
            });
        }

        let base_path = self
            .base_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        env.overlay = Some(build_activation_overlay(env, &base_path));
        env.state = EnvState::Active;
        tracing::info!(env = %env.name, "environment activated");
        Ok(())
    }

    pub fn deactivate(&mut self, env: &mut VirtualEnvironment) -> Result<(), EnvError> {
        if env.state != EnvState::Active {
            return Err(EnvError::InvalidState {
                operation: "deactivate",
                name: env.name.clone(),
                state: env.state,
            });
        }

        let mut command = build_deactivate_command(env);
        self.runner
            .run(&mut command, "environment deactivation failed")
            .map_err(|source| EnvError::Operation {
                operation: "deactivate",
                name: env.name.clone(),
                source,
            })?;
        env.overlay = None;
        env.state = EnvState::Inactive;
        tracing::info!(env = %env.name, "environment deactivated");
        Ok(())
    }
}

// The descriptor travels as `$1` so no path is ever parsed as shell text.
const POSIX_DEACTIVATE_SCRIPT: &str = ". \"$1\" && deactivate";

pub fn build_create_command(interpreter: &str, root: &Path) -> Command {
    let mut command = Command::new(interpreter);
    command.arg("-m").arg("venv").arg(root);
    command
}

pub fn build_deactivate_command(env: &VirtualEnvironment) -> Command {
    match env.platform {
        Platform::Posix => {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(POSIX_DEACTIVATE_SCRIPT)
                .arg("sh")
                .arg(env.activation_descriptor());
            env.apply_overlay(&mut command);
            command
        }
        Platform::Windows => {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(env.deactivation_entry());
            env.apply_overlay(&mut command);
            command
        }
    }
}

fn build_activation_overlay(env: &VirtualEnvironment, base_path: &OsString) -> ActivationOverlay {
    let mut path = OsString::from(env.scripts_dir().as_os_str());
    if !base_path.is_empty() {
        path.push(env.platform.path_separator());
        path.push(base_path);
    }
    ActivationOverlay {
        virtual_env: env.root.clone(),
        path,
        interpreter: env.python_path(),
    }
}
