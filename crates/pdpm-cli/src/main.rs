mod completion;
mod dispatch;
mod render;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use pdpm_installer::{default_project_root, Platform, ProjectLayout};
use pdpm_project::ProjectState;
use tracing_subscriber::EnvFilter;

use crate::completion::write_completions_script;
use crate::dispatch::{execute, exit_code_for, report_error, Verdict};
use crate::render::current_output_style;
use crate::session::run_session;

#[derive(Parser, Debug)]
#[command(name = "pdpm")]
#[command(about = "pdpm (Python Dependency Manager)", long_about = None)]
struct Cli {
    /// Project directory holding pyproject.toml, pdpm.lock and .cache
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,
    /// Emit debug diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Write project metadata to the manifest
    Init {
        name: String,
        author: String,
        description: String,
        license: String,
    },
    /// Choose the interpreter used to create environments
    SetPython { interpreter: String },
    /// Create a virtual environment under the project root
    CreateEnv { env_name: String },
    /// Activate the current virtual environment
    ActivateEnv,
    /// Deactivate the current virtual environment
    DeactivateEnv,
    /// Declare a dependency as `name` or `name==version`
    Add { package_name: String },
    /// Drop a declared dependency
    Remove { package_name: String },
    /// Reset every dependency to latest
    Update,
    /// Write the declared dependencies to pdpm.lock
    Lock,
    /// Re-create the environment and install every dependency
    Install,
    /// Print the declared dependencies
    List,
    /// Run one command per stdin line against a single project state
    Session,
    /// Print a shell completion script
    Completions { shell: Shell },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        let mut stdout = std::io::stdout();
        write_completions_script(shell, &mut stdout)?;
        return Ok(ExitCode::SUCCESS);
    }

    let style = current_output_style();
    let root = match cli.project_root {
        Some(root) => root,
        None => default_project_root()?,
    };
    let interpreter = default_interpreter()?;
    tracing::debug!(root = %root.display(), %interpreter, "opening project");
    let mut state = ProjectState::open(ProjectLayout::new(root), &interpreter)?;

    if cli.command == Commands::Session {
        let stdin = std::io::stdin();
        let verdict = run_session(&mut state, stdin.lock(), style)?;
        return Ok(exit_code_for(verdict));
    }

    let verdict = match execute(&mut state, cli.command, style) {
        Ok(()) => Verdict::Continue,
        Err(err) => report_error(&err, style),
    };
    Ok(exit_code_for(verdict))
}

fn default_interpreter() -> Result<String> {
    if let Some(interpreter) = std::env::var("PDPM_PYTHON")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        return Ok(interpreter);
    }
    Ok(Platform::current()?.default_interpreter().to_string())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("PDPM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
