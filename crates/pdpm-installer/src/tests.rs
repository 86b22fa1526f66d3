use super::*;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use pdpm_core::{PackageSet, PackageSpec};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, Option<String>)>,
    context: String,
}

/// Records every command instead of spawning it. Commands whose arguments
/// contain any of `fail_on` report a non-zero exit.
#[derive(Debug, Default)]
struct RecordingRunner {
    commands: Vec<RecordedCommand>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    fn failing_on(needles: &[&str]) -> Self {
        Self {
            commands: Vec::new(),
            fail_on: needles.iter().map(|needle| needle.to_string()).collect(),
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, command: &mut Command, context: &str) -> Result<(), ProcessError> {
        let recorded = RecordedCommand {
            program: command.get_program().to_string_lossy().into_owned(),
            args: command
                .get_args()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            envs: command
                .get_envs()
                .map(|(key, value)| {
                    (
                        key.to_string_lossy().into_owned(),
                        value.map(|v| v.to_string_lossy().into_owned()),
                    )
                })
                .collect(),
            context: context.to_string(),
        };
        let fails = recorded
            .args
            .iter()
            .any(|arg| self.fail_on.iter().any(|needle| arg.contains(needle.as_str())));
        self.commands.push(recorded);
        if fails {
            return Err(ProcessError::Failed {
                context: context.to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn build_test_layout_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "pdpm-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_layout() -> ProjectLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let layout = ProjectLayout::new(build_test_layout_path(nanos));
    std::fs::create_dir_all(layout.root()).expect("must create project root");
    layout
}

fn orchestrator(
    layout: &ProjectLayout,
    platform: Platform,
    runner: RecordingRunner,
) -> EnvironmentOrchestrator<RecordingRunner> {
    EnvironmentOrchestrator::new(layout.clone(), platform, runner).with_base_path("/usr/bin")
}

/// Stands in for what `python -m venv` would leave behind.
fn seed_activation_descriptor(layout: &ProjectLayout, name: &str, platform: Platform) {
    let env = VirtualEnvironment::new(layout, name, "python3", platform);
    std::fs::create_dir_all(env.scripts_dir()).expect("must create scripts dir");
    std::fs::write(env.activation_descriptor(), "# activate\n").expect("must write descriptor");
}

fn set_of(requests: &[&str]) -> PackageSet {
    let mut set = PackageSet::new();
    for request in requests {
        set.insert(PackageSpec::parse(request).expect("valid request"));
    }
    set
}

fn env_value<'a>(command: &'a RecordedCommand, key: &str) -> Option<Option<&'a str>> {
    command
        .envs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_deref())
}

#[test]
fn build_test_layout_path_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_layout_path(42), build_test_layout_path(42));
}

#[test]
fn platform_parse_accepts_known_families() {
    assert_eq!(Platform::parse("unix").expect("unix"), Platform::Posix);
    assert_eq!(Platform::parse("posix").expect("posix"), Platform::Posix);
    assert_eq!(Platform::parse("Windows").expect("windows"), Platform::Windows);
    assert_eq!(Platform::parse("nt").expect("nt"), Platform::Windows);
}

#[test]
fn platform_parse_rejects_unknown_values() {
    let err = Platform::parse("wasm").expect_err("wasm is unsupported");
    assert!(matches!(err, EnvError::UnsupportedPlatform(ref value) if value == "wasm"));
    assert_eq!(err.to_string(), "unsupported platform: 'wasm'");
}

#[test]
fn layout_paths_are_rooted_at_project() {
    let layout = ProjectLayout::new("/work/demo");
    assert_eq!(layout.manifest_path(), PathBuf::from("/work/demo/pyproject.toml"));
    assert_eq!(layout.lock_path(), PathBuf::from("/work/demo/pdpm.lock"));
    assert_eq!(
        layout.package_cache_dir(),
        PathBuf::from("/work/demo/.cache/packages")
    );
    assert_eq!(layout.env_dir("venv"), PathBuf::from("/work/demo/venv"));
}

#[test]
fn ensure_base_dirs_creates_hidden_package_cache() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    layout.ensure_base_dirs().expect("second call is a no-op");
    assert!(layout.package_cache_dir().is_dir());

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn environment_paths_follow_platform_layout() {
    let layout = ProjectLayout::new("/work/demo");
    let posix = VirtualEnvironment::new(&layout, "venv", "python3", Platform::Posix);
    assert_eq!(posix.python_path(), PathBuf::from("/work/demo/venv/bin/python"));
    assert_eq!(
        posix.activation_descriptor(),
        PathBuf::from("/work/demo/venv/bin/activate")
    );

    let windows = VirtualEnvironment::new(&layout, "venv", "python", Platform::Windows);
    assert_eq!(
        windows.python_path(),
        PathBuf::from("/work/demo/venv/Scripts/python.exe")
    );
    assert_eq!(
        windows.activation_descriptor(),
        PathBuf::from("/work/demo/venv/Scripts/activate.bat")
    );
    assert_eq!(
        windows.deactivation_entry(),
        PathBuf::from("/work/demo/venv/Scripts/deactivate.bat")
    );
    assert_eq!(windows.state(), EnvState::Absent);
}

#[test]
fn create_on_posix_runs_venv_and_stops_at_created() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());

    let env = orchestrator
        .create("python3.12", "venv")
        .expect("create should succeed");

    assert_eq!(env.state(), EnvState::Created);
    assert!(env.overlay().is_none());
    let commands = &orchestrator.runner_mut().commands;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].program, "python3.12");
    assert_eq!(
        commands[0].args,
        vec![
            "-m".to_string(),
            "venv".to_string(),
            layout.env_dir("venv").display().to_string()
        ]
    );
    assert_eq!(commands[0].context, "python -m venv failed");

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn create_on_windows_activates_automatically() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Windows);
    let mut orchestrator = orchestrator(&layout, Platform::Windows, RecordingRunner::default());

    let env = orchestrator
        .create("python", "venv")
        .expect("create should succeed");

    assert_eq!(env.state(), EnvState::Active);
    let overlay = env.overlay().expect("active env has overlay");
    assert_eq!(overlay.virtual_env, layout.env_dir("venv"));
    let mut expected_path = OsString::from(env.scripts_dir().as_os_str());
    expected_path.push(";/usr/bin");
    assert_eq!(overlay.path, expected_path);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn create_on_windows_without_descriptor_is_not_found() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Windows, RecordingRunner::default());

    let err = orchestrator
        .create("python", "venv")
        .expect_err("missing descriptor should fail activation");
    assert!(matches!(err, EnvError::NotFound { ref name, .. } if name == "venv"));

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn create_surfaces_subprocess_failure() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(
        &layout,
        Platform::Posix,
        RecordingRunner::failing_on(&["venv"]),
    );

    let err = orchestrator
        .create("python3", "venv")
        .expect_err("non-zero exit must not be ignored");
    match err {
        EnvError::Operation {
            operation,
            name,
            source,
        } => {
            assert_eq!(operation, "create");
            assert_eq!(name, "venv");
            assert!(source.to_string().contains("simulated failure"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn activate_without_descriptor_reports_missing_environment() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");

    let err = orchestrator
        .activate(&mut env)
        .expect_err("descriptor is absent");
    match &err {
        EnvError::NotFound { name, descriptor } => {
            assert_eq!(name, "venv");
            assert_eq!(descriptor, &layout.env_dir("venv").join("bin").join("activate"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.state(), EnvState::Created);
    assert!(err.to_string().contains("virtual environment 'venv' does not exist"));

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn activate_computes_overlay_without_touching_process_environment() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Posix);
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    let before = std::env::var_os("VIRTUAL_ENV");

    orchestrator.activate(&mut env).expect("must activate");

    assert_eq!(env.state(), EnvState::Active);
    let overlay = env.overlay().expect("overlay");
    let mut expected_path = OsString::from(env.scripts_dir().as_os_str());
    expected_path.push(":/usr/bin");
    assert_eq!(overlay.path, expected_path);
    assert_eq!(overlay.interpreter, env.python_path());
    assert_eq!(std::env::var_os("VIRTUAL_ENV"), before);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn deactivate_on_posix_sources_descriptor_in_shell() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Posix);
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    orchestrator.activate(&mut env).expect("must activate");

    orchestrator.deactivate(&mut env).expect("must deactivate");

    assert_eq!(env.state(), EnvState::Inactive);
    assert!(env.overlay().is_none());
    let last = orchestrator
        .runner_mut()
        .commands
        .last()
        .cloned()
        .expect("deactivate command");
    assert_eq!(last.program, "sh");
    assert_eq!(
        last.args,
        vec![
            "-c".to_string(),
            ". \"$1\" && deactivate".to_string(),
            "sh".to_string(),
            env.activation_descriptor().display().to_string()
        ]
    );

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn deactivate_on_windows_runs_batch_entry_point() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Windows);
    let mut orchestrator = orchestrator(&layout, Platform::Windows, RecordingRunner::default());
    let mut env = orchestrator.create("python", "venv").expect("must create");

    orchestrator.deactivate(&mut env).expect("must deactivate");

    let last = orchestrator
        .runner_mut()
        .commands
        .last()
        .cloned()
        .expect("deactivate command");
    assert_eq!(last.program, "cmd");
    assert_eq!(
        last.args,
        vec![
            "/C".to_string(),
            env.deactivation_entry().display().to_string()
        ]
    );
    assert_eq!(env.state(), EnvState::Inactive);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn deactivate_requires_active_environment() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");

    let err = orchestrator
        .deactivate(&mut env)
        .expect_err("created env cannot be deactivated");
    assert!(matches!(
        err,
        EnvError::InvalidState {
            state: EnvState::Created,
            ..
        }
    ));
    assert_eq!(orchestrator.runner_mut().commands.len(), 1);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn deactivate_surfaces_shell_failure_and_keeps_state() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Posix);
    let mut orchestrator = orchestrator(
        &layout,
        Platform::Posix,
        RecordingRunner::failing_on(&["deactivate"]),
    );
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    orchestrator.activate(&mut env).expect("must activate");

    let err = orchestrator
        .deactivate(&mut env)
        .expect_err("shell failure must surface");
    assert!(matches!(err, EnvError::Operation { operation: "deactivate", .. }));
    assert_eq!(env.state(), EnvState::Active);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_without_environment_spawns_nothing() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut events = 0;

    let err = install_packages(&mut orchestrator, &set_of(&["requests"]), None, |_| {
        events += 1
    })
    .expect_err("no environment");

    assert!(matches!(err, EnvError::NoEnvironment));
    assert!(orchestrator.runner_mut().commands.is_empty());
    assert_eq!(events, 0);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_reprovisions_then_installs_each_package_in_name_order() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    let packages = set_of(&["requests", "flask==3.0.2"]);

    let report = install_packages(&mut orchestrator, &packages, Some(&mut env), |_| {})
        .expect("install should succeed");

    assert!(report.is_success());
    assert_eq!(report.installed.len(), 2);
    let commands = &orchestrator.runner_mut().commands;
    assert_eq!(commands.len(), 4, "create, re-create, two installs");
    assert_eq!(commands[1].args[1], "venv");

    let cache_dir = layout.package_cache_dir().display().to_string();
    let python = env.python_path().display().to_string();
    assert_eq!(commands[2].program, python);
    assert_eq!(
        commands[2].args,
        vec!["-m", "pip", "install", "--cache-dir", cache_dir.as_str(), "flask==3.0.2"]
    );
    assert_eq!(commands[3].args[5], "requests==latest");
    assert_eq!(env_value(&commands[3], "VIRTUAL_ENV"), None);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_into_active_environment_applies_overlay_and_stays_active() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Posix);
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    orchestrator.activate(&mut env).expect("must activate");

    install_packages(&mut orchestrator, &set_of(&["requests"]), Some(&mut env), |_| {})
        .expect("install should succeed");

    assert_eq!(env.state(), EnvState::Active);
    let install = orchestrator
        .runner_mut()
        .commands
        .last()
        .cloned()
        .expect("install command");
    let root = layout.env_dir("venv").display().to_string();
    assert_eq!(env_value(&install, "VIRTUAL_ENV"), Some(Some(root.as_str())));
    assert_eq!(env_value(&install, "PYTHONHOME"), Some(None));

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_attempts_every_package_and_reports_failures() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(
        &layout,
        Platform::Posix,
        RecordingRunner::failing_on(&["broken=="]),
    );
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    let packages = set_of(&["alpha", "broken", "zeta"]);
    let mut finished = Vec::new();

    let err = install_packages(&mut orchestrator, &packages, Some(&mut env), |event| {
        if let InstallEvent::Finished { spec, ok } = event {
            finished.push((spec.name.clone(), ok));
        }
    })
    .expect_err("one package fails");

    assert_eq!(
        finished,
        vec![
            ("alpha".to_string(), true),
            ("broken".to_string(), false),
            ("zeta".to_string(), true)
        ]
    );
    let EnvError::Install(report) = err else {
        panic!("expected install error");
    };
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].spec.name, "broken");
    assert_eq!(
        report.to_string(),
        "failed to install 1 of 3 package(s) into 'venv': broken==latest"
    );

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_aborts_when_reprovisioning_fails() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    orchestrator.runner_mut().fail_on = vec!["venv".to_string()];

    let err = install_packages(&mut orchestrator, &set_of(&["requests"]), Some(&mut env), |_| {})
        .expect_err("re-create fails");

    assert!(matches!(err, EnvError::Operation { operation: "re-create", .. }));
    assert_eq!(orchestrator.runner_mut().commands.len(), 2);

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn install_refuses_inactive_environment() {
    let layout = test_layout();
    seed_activation_descriptor(&layout, "venv", Platform::Posix);
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());
    let mut env = orchestrator.create("python3", "venv").expect("must create");
    orchestrator.activate(&mut env).expect("must activate");
    orchestrator.deactivate(&mut env).expect("must deactivate");

    let err = install_packages(&mut orchestrator, &set_of(&["requests"]), Some(&mut env), |_| {})
        .expect_err("inactive env");
    assert!(matches!(
        err,
        EnvError::InvalidState {
            state: EnvState::Inactive,
            ..
        }
    ));

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn process_error_detects_missing_program() {
    let err = run_command(
        &mut Command::new("pdpm-test-program-that-does-not-exist"),
        "spawn failed",
    )
    .expect_err("program does not exist");
    assert!(matches!(
        err,
        ProcessError::Spawn { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound
    ));
    assert!(err.to_string().starts_with("spawn failed: command failed to start"));
}

#[test]
fn validate_env_name_accepts_single_directory_names() {
    for name in ["venv", ".venv", "env-3.12", "my_env"] {
        validate_env_name(name).unwrap_or_else(|err| panic!("'{name}' should be valid: {err}"));
    }
}

#[test]
fn validate_env_name_rejects_paths_outside_a_single_component() {
    for name in ["", "  ", ".", "..", "/etc/pdpm-venv", "nested/venv", "venv/", "..\\up"] {
        let err = validate_env_name(name).expect_err("name should be rejected");
        assert!(
            matches!(err, EnvError::InvalidName { .. }),
            "unexpected error for '{name}': {err}"
        );
    }
}

#[test]
fn create_rejects_invalid_name_without_spawning() {
    let layout = test_layout();
    let mut orchestrator = orchestrator(&layout, Platform::Posix, RecordingRunner::default());

    for name in ["", "..", "/etc/pdpm-venv"] {
        let err = orchestrator
            .create("python3", name)
            .expect_err("invalid env name must be rejected");
        assert!(matches!(err, EnvError::InvalidName { .. }), "unexpected: {err}");
    }
    assert!(orchestrator.runner_mut().commands.is_empty());

    let _ = std::fs::remove_dir_all(layout.root());
}

#[test]
fn deactivate_passes_descriptor_as_argument_when_root_has_quotes() {
    let layout = ProjectLayout::new(test_layout().root().join("o'brien $(touch injected)"));
    let env = VirtualEnvironment::new(&layout, "venv", "python3", Platform::Posix);

    let command = build_deactivate_command(&env);

    let args = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(args[1], ". \"$1\" && deactivate");
    assert_eq!(args[3], env.activation_descriptor().display().to_string());
    assert!(!args[1].contains("o'brien"));

    let _ = std::fs::remove_dir_all(layout.root().parent().expect("test root"));
}

#[cfg(unix)]
#[test]
fn deactivate_script_runs_under_sh_when_root_has_quotes() {
    let base = test_layout();
    let layout = ProjectLayout::new(base.root().join("o'brien $(touch injected)"));
    let env = VirtualEnvironment::new(&layout, "venv", "python3", Platform::Posix);
    std::fs::create_dir_all(env.scripts_dir()).expect("must create scripts dir");
    std::fs::write(env.activation_descriptor(), "deactivate() { :; }\n")
        .expect("must write descriptor");

    run_command(&mut build_deactivate_command(&env), "deactivate failed")
        .expect("quoted root must not break the shell script");
    assert!(!base.root().join("injected").exists());
    assert!(!std::path::Path::new("injected").exists());

    let _ = std::fs::remove_dir_all(base.root());
}
