//! Run lifecycle controller.
//!
//! Takes one invocation from scenario selection through the provisioning run
//! and its post-run steps, and decides the process exit code.

use super::post_process::process_run_completion;
use crate::cli::{parse_override, Cli, OutputLine, OutputTx};
use crate::config::{display_value, Configuration, MIGRATED_SKIP};
use crate::engine::{ProcessRunner, ProvisionCommand, PtyChild, RunFlags};
use crate::error::{exit_code, InstallerError, Result};
use crate::logging::Logging;
use crate::model::RunResult;
use crate::progress::{NoProgress, ProgressBar, ProgressSink};
use crate::scenario::{ChangeGate, Resolution, ScenarioSelector, ScenarioStore};
use crate::system_check;
use crate::text_summary::{build_scenario_list, scenario_listing};
use crate::wizard::Wizard;
use dialoguer::console::Term;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tempfile::TempPath;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

/// Temporary files removed when the run ends, on success, failure or early return.
#[derive(Default)]
pub(crate) struct Cleanup {
    paths: Vec<TempPath>,
}

impl Cleanup {
    pub fn register(&mut self, path: TempPath) {
        self.paths.push(path);
    }

    pub fn run(&mut self) {
        for path in self.paths.drain(..) {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!("removed {shown}"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not remove {shown}: {e}"),
            }
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.run();
    }
}

/// Answers file for runs that must not touch the real one. The name is
/// random and the file is created exclusively with owner-only permissions.
fn temp_answers_file(config: &Configuration) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("scenario-installer-answers-")
        .suffix(".yaml")
        .tempfile()?;
    config.write_answers(file.as_file_mut())?;
    Ok(file.into_temp_path())
}

fn send(out: &OutputTx, line: OutputLine) {
    let _ = out.send(line);
}

/// Drive a full installer invocation and return the exit code.
pub(crate) async fn run_controller(
    args: &Cli,
    logging: &Logging,
    out: &OutputTx,
    wizard: &mut dyn Wizard,
) -> Result<i32> {
    let started = Instant::now();
    let store = ScenarioStore::new(&args.config_dir);

    if args.list_scenarios {
        list_scenarios(args, &store, out)?;
        return Ok(exit_code::SUCCESS);
    }

    let flags = args.selection_flags();
    let selector = ScenarioSelector::new(&store, &flags);
    let scenario = match selector.resolve(wizard)? {
        Resolution::Selected(path) => path,
        Resolution::Cancelled => return Ok(exit_code::SUCCESS),
    };
    let gate = selector.check_scenario_change(&scenario, wizard)?;
    if let ChangeGate::Exit { code, report } = gate {
        for line in report {
            send(out, OutputLine::Stdout(line));
        }
        return Ok(code);
    }

    let mut config = Configuration::load(&scenario)?;
    if selector.scenario_changed(&scenario) {
        if let Some(previous) = store.previous_scenario() {
            info!("Switching from scenario {}", previous.name);
        }
        config = migrate_from_previous(&store, config)?;
    }
    let log_path = open_log(logging, &config, args.log_level);
    info!("Using scenario {} ({})", config.name(), scenario.display());

    apply_overrides(&mut config, args)?;
    debug!(
        "{} modules with {} parameters",
        config.modules().count(),
        config.params().count()
    );

    if args.skip_checks {
        info!("Skipping system checks");
    } else if let Some(dir) = config.app().checks_dir() {
        system_check::run_checks(&dir)?;
    }

    let mut cleanup = Cleanup::default();
    let answers = if args.temporary_answers() {
        let temp = temp_answers_file(&config)?;
        let path = temp.to_path_buf();
        cleanup.register(temp);
        path
    } else {
        config.store_answers(config.answer_file())?;
        config.answer_file().to_path_buf()
    };
    debug!("answers written to {}", answers.display());

    let command = ProvisionCommand::build(
        config.app(),
        &answers,
        RunFlags {
            noop: args.noop,
            profile: args.profile,
        },
    );
    let temp_artifact = args.temporary_answers().then(|| answers.clone());
    let result = provision(command, temp_artifact, args.verbose).await?;

    let processed = process_run_completion(
        args,
        &store,
        &config,
        &result,
        log_path.as_deref(),
        started.elapsed(),
    );
    if processed.linked {
        info!(
            "Recorded {} as the installed scenario in {}",
            config.name(),
            store.link_path().display()
        );
    }
    for message in processed.messages {
        send(out, OutputLine::Stdout(message));
    }
    for message in processed.errors {
        send(out, OutputLine::Stderr(message));
    }
    cleanup.run();
    Ok(result.exit_code)
}

fn list_scenarios(args: &Cli, store: &ScenarioStore, out: &OutputTx) -> Result<()> {
    let scenarios = store.list_scenarios();
    let previous = store.previous_scenario_path();
    if args.json {
        let listing = scenario_listing(&scenarios, previous);
        let json = serde_json::to_string_pretty(&listing)
            .map_err(|e| InstallerError::Io(io::Error::other(e)))?;
        send(out, OutputLine::Stdout(json));
    } else {
        for line in build_scenario_list(&scenarios, previous, store.config_dir()).lines {
            send(out, OutputLine::Stdout(line));
        }
    }
    Ok(())
}

/// Bring settings and answers over from the previously installed scenario,
/// then reload so the result reflects what was written.
fn migrate_from_previous(
    store: &ScenarioStore,
    mut config: Configuration,
) -> Result<Configuration> {
    let Some(previous) = store.previous_scenario_path() else {
        return Ok(config);
    };
    info!("Migrating settings from {}", previous.display());
    let previous = Configuration::load(previous)?;
    config.migrate_from(&previous, MIGRATED_SKIP)?;
    let mut config = config.reload()?;
    config.preset_defaults_from(&previous);
    Ok(config)
}

/// Point the file log at the scenario's log path. Failure only costs the file.
fn open_log(
    logging: &Logging,
    config: &Configuration,
    cli_level: Option<LevelFilter>,
) -> Option<PathBuf> {
    if cli_level.is_none() {
        if let Some(level) = config.app().str("log_level") {
            match level.parse::<LevelFilter>() {
                Ok(level) => logging.set_file_level(level),
                Err(_) => warn!("ignoring unknown log_level '{level}'"),
            }
        }
    }
    let log_dir = config.app().log_dir();
    match logging.file.open(&log_dir, config.app().log_name()) {
        Ok(path) => {
            debug!("logging to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("could not open log file in {}: {e}", log_dir.display());
            None
        }
    }
}

fn apply_overrides(config: &mut Configuration, args: &Cli) -> Result<()> {
    for (module, enabled) in &args.module_toggles {
        config.set_module_enabled(module, *enabled)?;
    }
    for raw in &args.overrides {
        let (module, param, value) = parse_override(raw)?;
        config.set_param(&module, &param, value)?;
        if let Some(p) = config.param(&module, &param) {
            let value = display_value(p.value.as_ref());
            let doc = match p.doc.as_deref() {
                Some(doc) => format!(" ({doc})"),
                None => String::new(),
            };
            info!("Set {} to {value}{doc}", p.identifier());
        }
    }
    Ok(())
}

/// Spawn the child and run it to completion on a blocking thread. Interrupts
/// reach the child through the terminal; here they are only logged so the
/// post-run steps still happen.
async fn provision(
    command: ProvisionCommand,
    temp_artifact: Option<PathBuf>,
    verbose: bool,
) -> Result<RunResult> {
    info!("Running {command}");
    let child = PtyChild::spawn(&command)?;
    let runner = ProcessRunner::new(temp_artifact);
    let mut task = tokio::task::spawn_blocking(move || {
        let mut progress: Box<dyn ProgressSink> = if verbose {
            Box::new(NoProgress)
        } else {
            Box::new(ProgressBar::new(Term::stdout()))
        };
        runner.run(child, progress.as_mut())
    });

    let mut listening = true;
    loop {
        tokio::select! {
            joined = &mut task => {
                return joined.map_err(|e| InstallerError::Io(io::Error::other(e)));
            }
            signal = tokio::signal::ctrl_c(), if listening => {
                match signal {
                    Ok(()) => warn!("Interrupted, waiting for the provisioning process to exit"),
                    Err(e) => {
                        warn!("cannot listen for interrupts: {e}");
                        listening = false;
                    }
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::fixtures::write_scenario;
    use crate::logging;
    use crate::wizard::ScriptedWizard;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tokio::sync::mpsc;

    /// A scenario whose provisioning step is a shell script.
    fn shell_scenario(dir: &Path, stem: &str, script: &str, answers: &str) -> PathBuf {
        let extra = format!(
            "log_dir: {}\nprovision_command: [/bin/sh, -c, '{script}', provision]\n",
            dir.join("log").display()
        );
        write_scenario(dir, stem, &extra, answers)
    }

    fn not_recorded(dir: &Path) -> bool {
        ScenarioStore::new(dir).previous_scenario_path().is_none()
    }

    async fn invoke(dir: &Path, extra: &[&str]) -> (Result<i32>, Vec<String>) {
        let dir = dir.display().to_string();
        let mut argv = vec!["scenario-installer", "--verbose", "--config-dir"];
        argv.push(&dir);
        argv.extend_from_slice(extra);
        let args = Cli::try_parse_args(argv).unwrap();
        let logging = logging::init(LevelFilter::DEBUG, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut wizard = ScriptedWizard::default();
        let result = run_controller(&args, &logging, &tx, &mut wizard).await;
        drop(tx);
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            let (OutputLine::Stdout(l) | OutputLine::Stderr(l)) = line;
            lines.push(l);
        }
        (result, lines)
    }

    #[tokio::test]
    async fn successful_run_saves_answers_and_records_the_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = shell_scenario(
            dir.path(),
            "small",
            "echo \"Notice: applied from $INSTALLER_ANSWER_FILE\"; exit 2",
            "web:\n  port: 80\n",
        );

        let (result, lines) = invoke(dir.path(), &["--set", "web::port=8080"]).await;

        assert_eq!(result.unwrap(), 2);
        assert!(lines.iter().any(|l| l.contains("Success")));
        let answers = fs::read_to_string(dir.path().join("small-answers.yaml")).unwrap();
        assert!(answers.contains("port: 8080"));
        let store = ScenarioStore::new(dir.path());
        assert_eq!(
            store.previous_scenario_path(),
            Some(fs::canonicalize(&scenario).unwrap().as_path())
        );
        assert!(dir.path().join("log/installer.log").is_file());
    }

    #[tokio::test]
    async fn noop_runs_leave_answers_and_pointer_alone() {
        let dir = tempfile::tempdir().unwrap();
        shell_scenario(dir.path(), "small", "exit 0", "web:\n  port: 80\n");

        let (result, _) = invoke(dir.path(), &["--noop", "--set", "web::port=1"]).await;

        assert_eq!(result.unwrap(), 0);
        let answers = fs::read_to_string(dir.path().join("small-answers.yaml")).unwrap();
        assert!(answers.contains("port: 80"));
        assert!(not_recorded(dir.path()));
    }

    #[tokio::test]
    async fn throwaway_answers_never_follow_a_planted_link() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("victim");
        fs::write(&victim, "IMPORTANT=1\n").unwrap();
        let pid = std::process::id();
        let predictable = format!("scenario-installer-answers-{pid}.yaml");
        let planted = std::env::temp_dir().join(predictable);
        let _ = fs::remove_file(&planted);
        std::os::unix::fs::symlink(&victim, &planted).unwrap();
        let seen = dir.path().join("seen");
        let script = format!("echo $INSTALLER_ANSWER_FILE > {}", seen.display());
        shell_scenario(dir.path(), "small", &script, "web:\n  secret: hunter2\n");

        let (result, _) = invoke(dir.path(), &["--noop"]).await;
        let _ = fs::remove_file(&planted);

        assert_eq!(result.unwrap(), 0);
        assert_eq!(fs::read_to_string(&victim).unwrap(), "IMPORTANT=1\n");
        let used = PathBuf::from(fs::read_to_string(&seen).unwrap().trim());
        assert_ne!(used, planted);
        assert!(used.starts_with(std::env::temp_dir()));
        assert!(!used.exists());
    }

    #[test]
    fn throwaway_answers_are_private_and_removed_by_cleanup() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = write_scenario(dir.path(), "small", "", "web:\n  secret: hunter2\n");
        let config = Configuration::load(&path).unwrap();

        let first = temp_answers_file(&config).unwrap();
        let second = temp_answers_file(&config).unwrap();
        assert_ne!(first.to_path_buf(), second.to_path_buf());
        let meta = fs::symlink_metadata(&first).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        let written = fs::read_to_string(&first).unwrap();
        assert!(written.contains("secret: hunter2"));

        let paths = [first.to_path_buf(), second.to_path_buf()];
        let mut cleanup = Cleanup::default();
        cleanup.register(first);
        cleanup.register(second);
        cleanup.run();
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn failed_runs_do_not_move_the_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo \"Error: broken\"; exit 6";
        shell_scenario(dir.path(), "small", script, "web: true\n");

        let (result, lines) = invoke(dir.path(), &[]).await;

        assert_eq!(result.unwrap(), 6);
        assert!(lines.iter().any(|l| l.contains("errors")));
        assert!(not_recorded(dir.path()));
    }

    #[tokio::test]
    async fn listing_exits_without_running() {
        let dir = tempfile::tempdir().unwrap();
        shell_scenario(dir.path(), "small", "exit 9", "web: true\n");

        let (result, lines) = invoke(dir.path(), &["--list-scenarios", "--json"]).await;

        assert_eq!(result.unwrap(), 0);
        let listing: serde_json::Value = serde_json::from_str(&lines.join("\n")).unwrap();
        assert_eq!(listing[0]["name"], "small");
        assert_eq!(listing[0]["installed"], false);
    }

    #[tokio::test]
    async fn bad_overrides_stop_before_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        shell_scenario(dir.path(), "small", "exit 0", "web:\n  port: 80\n");

        let (result, _) = invoke(dir.path(), &["--enable-module", "mail"]).await;
        assert_eq!(result.unwrap_err().exit_code(), exit_code::UNKNOWN_MODULE);

        let (result, _) = invoke(dir.path(), &["--set", "web::nope=1"]).await;
        assert_eq!(result.unwrap_err().exit_code(), exit_code::INVALID_VALUES);
        assert!(not_recorded(dir.path()));
    }

    #[tokio::test]
    async fn scenario_changes_need_force_or_stop_at_the_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let a = shell_scenario(dir.path(), "a", "exit 0", "web:\n  port: 80\n");
        shell_scenario(dir.path(), "b", "exit 0", "web:\n  port: 81\n");
        let store = ScenarioStore::new(dir.path());
        store.link_last_scenario(&a).unwrap();

        let (result, _) = invoke(dir.path(), &["-S", "b"]).await;
        assert_eq!(result.unwrap_err().exit_code(), exit_code::SCENARIO_ERROR);

        let (result, lines) = invoke(dir.path(), &["-S", "b", "--compare-scenarios"]).await;
        assert_eq!(result.unwrap(), 0);
        assert!(lines.iter().any(|l| l.contains("web::port: 81 -> 80")));

        let (result, _) = invoke(dir.path(), &["-S", "b", "--force"]).await;
        assert_eq!(result.unwrap(), 0);
        let store = ScenarioStore::new(dir.path());
        let recorded = store.previous_scenario_path().unwrap();
        assert!(recorded.ends_with("b.yaml"));
        let answers = fs::read_to_string(dir.path().join("b-answers.yaml")).unwrap();
        assert!(answers.contains("port: 80"));
    }

    #[tokio::test]
    async fn failing_system_checks_block_the_run() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let checks = dir.path().join("checks");
        fs::create_dir(&checks).unwrap();
        let check = checks.join("10-fail");
        fs::write(&check, "#!/bin/sh\nexit 1\n").unwrap();
        fs::set_permissions(&check, fs::Permissions::from_mode(0o755)).unwrap();
        let extra = format!(
            "checks_dir: {}\nlog_dir: {}\nprovision_command: [/bin/sh, -c, 'exit 0']\n",
            checks.display(),
            dir.path().join("log").display()
        );
        write_scenario(dir.path(), "small", &extra, "web: true\n");

        let (result, _) = invoke(dir.path(), &[]).await;
        assert_eq!(result.unwrap_err().exit_code(), exit_code::INVALID_SYSTEM);

        let (result, _) = invoke(dir.path(), &["--skip-checks-i-know-better"]).await;
        assert_eq!(result.unwrap(), 0);
    }
}
