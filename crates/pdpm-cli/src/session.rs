use std::io::BufRead;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pdpm_installer::CommandRunner;
use pdpm_project::ProjectState;

use crate::dispatch::{execute, report_error, Verdict};
use crate::render::{print_status, OutputStyle};
use crate::Cli;

/// Runs one command per input line against the same project state.
///
/// Blank lines and `#` comments are skipped. A fatal error stops the
/// session; any other failure is remembered and reported in the verdict.
pub(crate) fn run_session<R, B>(
    state: &mut ProjectState<R>,
    input: B,
    style: OutputStyle,
) -> Result<Verdict>
where
    R: CommandRunner,
    B: BufRead,
{
    let mut verdict = Verdict::Continue;
    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("failed reading session line {}", index + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens = match split_command_line(trimmed) {
            Ok(tokens) => tokens,
            Err(err) => {
                print_status(style, "err", &format!("line {}: {err}", index + 1));
                verdict = Verdict::Failed;
                continue;
            }
        };
        let cli = match Cli::try_parse_from(std::iter::once("pdpm".to_string()).chain(tokens)) {
            Ok(cli) => cli,
            Err(err) => {
                let _ = err.print();
                if err.use_stderr() {
                    verdict = Verdict::Failed;
                }
                continue;
            }
        };
        if cli.project_root.is_some() {
            print_status(style, "warn", "--project-root is ignored inside a session");
        }

        tracing::debug!(line = index + 1, command = ?cli.command, "session command");
        if let Err(err) = execute(state, cli.command, style) {
            match report_error(&err, style) {
                Verdict::Continue => {}
                Verdict::Failed => verdict = Verdict::Failed,
                Verdict::Abort => return Ok(Verdict::Abort),
            }
        }
    }
    Ok(verdict)
}

/// Splits a line on whitespace, honoring single and double quotes.
///
/// Single quotes are literal. Inside double quotes a backslash escapes `"`
/// and `\`.
pub(crate) fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => bail!("unterminated single quote"),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => bail!("unterminated double quote"),
                        },
                        Some(inner) => current.push(inner),
                        None => bail!("unterminated double quote"),
                    }
                }
            }
            ch if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
