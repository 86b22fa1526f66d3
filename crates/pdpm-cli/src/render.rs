use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use pdpm_core::PackageSpec;
use pdpm_installer::{InstallReport, VirtualEnvironment};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::env::var("PDPM_OUTPUT").ok().as_deref(),
        std::env::var_os("NO_COLOR").is_some(),
        std::io::stdout().is_terminal(),
    )
}

pub(crate) fn resolve_output_style(
    requested: Option<&str>,
    no_color: bool,
    is_terminal: bool,
) -> OutputStyle {
    match requested.map(str::trim) {
        Some("plain") => return OutputStyle::Plain,
        Some("rich") => return OutputStyle::Rich,
        _ => {}
    }
    if no_color || !is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "err" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

pub(crate) fn print_status(style: OutputStyle, status: &str, message: &str) {
    let line = render_status_line(style, status, message);
    if status == "err" || status == "warn" {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

pub(crate) fn format_list_lines(specs: &[PackageSpec], style: OutputStyle) -> Vec<String> {
    let header = "List of packages:";
    let header = match style {
        OutputStyle::Plain => header.to_string(),
        OutputStyle::Rich => colorize(header_style(), header),
    };
    let mut lines = vec![header];
    lines.extend(specs.iter().map(ToString::to_string));
    lines
}

pub(crate) fn format_environment_line(env: &VirtualEnvironment) -> String {
    format!(
        "environment '{}' is {} ({})",
        env.name(),
        env.state(),
        env.root().display()
    )
}

pub(crate) fn format_install_report_lines(
    report: &InstallReport,
    style: OutputStyle,
    elapsed: Option<Duration>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for spec in &report.installed {
        lines.push(render_status_line(
            style,
            "ok",
            &format!("installed {}", spec.specifier()),
        ));
    }
    for failure in &report.failed {
        lines.push(render_status_line(
            style,
            "err",
            &format!("{}: {}", failure.spec.specifier(), failure.error),
        ));
    }
    let mut summary = format!(
        "{} of {} package(s) installed into '{}'",
        report.installed.len(),
        report.attempted(),
        report.environment
    );
    if let Some(elapsed) = elapsed {
        summary.push_str(&format!(" in {}", HumanDuration(elapsed)));
    }
    let status = if report.is_success() { "ok" } else { "err" };
    lines.push(render_status_line(style, status, &summary));
    lines
}

/// Per-package progress for one install run. Draws only in rich mode.
pub(crate) struct InstallProgress {
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl InstallProgress {
    pub(crate) fn start(style: OutputStyle, environment: &str, total: usize) -> Self {
        let progress_bar = (style == OutputStyle::Rich).then(|| {
            let progress_bar = ProgressBar::new(total as u64);
            if let Ok(template) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {prefix} [{bar:20.cyan/blue}] {pos}/{len} {wide_msg}",
            ) {
                progress_bar.set_style(template.progress_chars("=>-"));
            }
            progress_bar.set_prefix(format!("install into '{environment}'"));
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            progress_bar
        });
        Self {
            progress_bar,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn package_started(&self, spec: &PackageSpec) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_message(spec.specifier());
        }
    }

    pub(crate) fn package_finished(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.inc(1);
        }
    }

    /// Clears the bar and returns how long the run took.
    pub(crate) fn finish(self) -> Duration {
        if let Some(progress_bar) = self.progress_bar {
            progress_bar.finish_and_clear();
        }
        self.started_at.elapsed()
    }
}

fn header_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
