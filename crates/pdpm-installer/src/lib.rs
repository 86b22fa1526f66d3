mod environment;
mod error;
mod install;
mod layout;
mod process;

pub use environment::{
    build_create_command, build_deactivate_command, ActivationOverlay, EnvState,
    EnvironmentOrchestrator, VirtualEnvironment,
};
pub use error::EnvError;
pub use install::{
    build_install_command, install_packages, InstallEvent, InstallFailure, InstallReport,
};
pub use layout::{default_project_root, validate_env_name, Platform, ProjectLayout};
pub use process::{run_command, CommandRunner, ProcessError, SystemRunner};

#[cfg(test)]
mod tests;
