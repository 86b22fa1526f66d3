use std::process::ExitCode;

use pdpm_installer::{CommandRunner, EnvError, InstallEvent};
use pdpm_project::{Disposition, ProjectError, ProjectState};

use crate::render::{
    format_environment_line, format_install_report_lines, format_list_lines, print_status,
    render_status_line, InstallProgress, OutputStyle,
};
use crate::Commands;

/// Runs one project command against `state`, printing its result.
pub(crate) fn execute<R: CommandRunner>(
    state: &mut ProjectState<R>,
    command: Commands,
    style: OutputStyle,
) -> Result<(), ProjectError> {
    match command {
        Commands::Init {
            name,
            author,
            description,
            license,
        } => {
            state.init(&name, &author, &description, &license)?;
            if let Some(metadata) = state.metadata() {
                print_status(
                    style,
                    "ok",
                    &format!(
                        "initialized project '{}' by {} ({})",
                        metadata.name, metadata.author, metadata.license
                    ),
                );
            }
        }
        Commands::SetPython { interpreter } => {
            state.set_interpreter(&interpreter);
            print_status(
                style,
                "ok",
                &format!("python interpreter set to {}", state.interpreter()),
            );
        }
        Commands::CreateEnv { env_name } => {
            let env = state.create_environment(&env_name)?;
            print_status(style, "ok", &format_environment_line(env));
        }
        Commands::ActivateEnv => {
            let env = state.activate_environment()?;
            print_status(style, "ok", &format_environment_line(env));
        }
        Commands::DeactivateEnv => {
            let env = state.deactivate_environment()?;
            print_status(style, "ok", &format_environment_line(env));
        }
        Commands::Add { package_name } => {
            let spec = state.add_package(&package_name)?;
            print_status(style, "ok", &format!("added {spec}"));
        }
        Commands::Remove { package_name } => {
            if state.remove_package(&package_name)? {
                print_status(style, "ok", &format!("removed {package_name}"));
            } else {
                print_status(style, "step", &format!("{package_name} is not a dependency"));
            }
        }
        Commands::Update => {
            state.update_packages()?;
            print_status(
                style,
                "ok",
                &format!("reset {} package(s) to latest", state.packages().len()),
            );
        }
        Commands::Lock => {
            let path = state.lock()?;
            print_status(style, "ok", &format!("locked packages in {}", path.display()));
        }
        Commands::Install => run_install(state, style)?,
        Commands::List => {
            for line in format_list_lines(&state.list_packages(), style) {
                println!("{line}");
            }
        }
        Commands::Session | Commands::Completions { .. } => {
            print_status(style, "warn", "command is only available at the top level");
        }
    }
    Ok(())
}

fn run_install<R: CommandRunner>(
    state: &mut ProjectState<R>,
    style: OutputStyle,
) -> Result<(), ProjectError> {
    let environment = state
        .environment()
        .map(|env| env.name().to_string())
        .unwrap_or_default();
    let mut progress: Option<InstallProgress> = None;
    let result = state.install(|event| match event {
        InstallEvent::Reprovisioned { total } => {
            progress = Some(InstallProgress::start(style, &environment, total));
        }
        InstallEvent::Started { spec } => {
            if let Some(progress) = &progress {
                progress.package_started(spec);
            }
        }
        InstallEvent::Finished { .. } => {
            if let Some(progress) = &progress {
                progress.package_finished();
            }
        }
    });
    let elapsed = progress.map(InstallProgress::finish);

    match result {
        Ok(report) => {
            for line in format_install_report_lines(&report, style, elapsed) {
                println!("{line}");
            }
            Ok(())
        }
        Err(ProjectError::Environment(EnvError::Install(report))) => {
            for line in format_install_report_lines(&report, style, elapsed) {
                eprintln!("{line}");
            }
            Err(ProjectError::Environment(EnvError::Install(report)))
        }
        Err(err) => Err(err),
    }
}

/// What the command boundary does after a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Continue,
    Failed,
    Abort,
}

pub(crate) fn report_error(err: &ProjectError, style: OutputStyle) -> Verdict {
    match err.disposition() {
        Disposition::Graceful => {
            eprintln!("{}", render_status_line(style, "warn", &err.to_string()));
            Verdict::Continue
        }
        Disposition::Failed => {
            // Install failures were already listed per package.
            if !matches!(err, ProjectError::Environment(EnvError::Install(_))) {
                eprintln!("{}", render_status_line(style, "err", &err.to_string()));
            }
            Verdict::Failed
        }
        Disposition::Fatal => {
            eprintln!("{}", render_status_line(style, "err", &err.to_string()));
            Verdict::Abort
        }
    }
}

pub(crate) fn exit_code_for(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Continue => ExitCode::SUCCESS,
        Verdict::Failed | Verdict::Abort => ExitCode::FAILURE,
    }
}
