use crate::error::{InstallerError, Result};
use crate::logging;
use crate::orchestrator::run_controller;
use crate::scenario::SelectionFlags;
use crate::wizard::TerminalWizard;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;

/// Output line routing for stdout/stderr writer.
pub(crate) enum OutputLine {
    Stdout(String),
    Stderr(String),
}

pub(crate) type OutputTx = mpsc::UnboundedSender<OutputLine>;

/// Spawn a blocking writer for stdout/stderr. Locks are taken per line since
/// prompts and the progress bar write to the same terminal.
fn spawn_output_writer() -> (OutputTx, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(std::io::stdout().lock(), "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(std::io::stderr().lock(), "{}", msg);
                }
            }
        }

        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scenario-installer",
    version,
    about = "Scenario-driven front end for a configuration-management provisioning run"
)]
pub struct Cli {
    /// Directory holding scenario definitions (a file path means its directory)
    #[arg(
        long,
        env = "INSTALLER_CONFIG_DIR",
        default_value = "/etc/scenario-installer/scenarios.d"
    )]
    pub config_dir: PathBuf,

    /// Use the scenario with this file stem
    #[arg(short = 'S', long)]
    pub scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(long)]
    pub list_scenarios: bool,

    /// Print the scenario list as JSON
    #[arg(long, requires = "list_scenarios")]
    pub json: bool,

    /// Allow changing the installed scenario without confirmation
    #[arg(long)]
    pub force: bool,

    /// Show what a scenario change would do and exit
    #[arg(long)]
    pub compare_scenarios: bool,

    /// Ask for the scenario and confirm scenario changes interactively
    #[arg(short, long)]
    pub interactive: bool,

    /// Run the provisioning tool in dry-run mode; answers are not saved
    #[arg(short, long)]
    pub noop: bool,

    /// Ask the provisioning tool for profiling output
    #[arg(short, long)]
    pub profile: bool,

    /// Use answers for this run only
    #[arg(short, long)]
    pub dont_save_answers: bool,

    /// Echo the log to stdout instead of showing a progress bar
    #[arg(short, long)]
    pub verbose: bool,

    /// Level of messages shown with --verbose
    #[arg(short = 'l', long, default_value = "info")]
    pub verbose_log_level: LevelFilter,

    /// Level of messages written to the log file [default: scenario log_level, else debug]
    #[arg(long)]
    pub log_level: Option<LevelFilter>,

    /// Skip system checks
    #[arg(short, long = "skip-checks-i-know-better")]
    pub skip_checks: bool,

    /// Enable a module (repeatable)
    #[arg(long, value_name = "MODULE")]
    pub enable_module: Vec<String>,

    /// Disable a module (repeatable)
    #[arg(long, value_name = "MODULE")]
    pub disable_module: Vec<String>,

    /// Override a parameter, value parsed as YAML (repeatable)
    #[arg(long = "set", value_name = "MODULE::PARAM=VALUE")]
    pub overrides: Vec<String>,

    /// Write a JSON summary of the run
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Module toggles in command-line order, later flags winning.
    #[arg(skip)]
    pub module_toggles: IndexMap<String, bool>,
}

impl Cli {
    /// Parse the process arguments, exiting on usage errors.
    pub fn parse_args() -> Self {
        match Self::try_parse_args(std::env::args_os()) {
            Ok(cli) => cli,
            Err(e) => e.exit(),
        }
    }

    pub(crate) fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        cli.module_toggles = module_toggles(&matches);
        Ok(cli)
    }

    pub fn selection_flags(&self) -> SelectionFlags {
        SelectionFlags {
            scenario: self.scenario.clone(),
            force: self.force,
            compare: self.compare_scenarios,
            interactive: self.interactive,
        }
    }

    /// Answers go to a throwaway file instead of the scenario's answer file.
    pub fn temporary_answers(&self) -> bool {
        self.noop || self.dont_save_answers
    }
}

fn module_toggles(matches: &ArgMatches) -> IndexMap<String, bool> {
    let mut flagged: Vec<(usize, String, bool)> = Vec::new();
    for (id, enabled) in [("enable_module", true), ("disable_module", false)] {
        let Some(indices) = matches.indices_of(id) else {
            continue;
        };
        let Some(names) = matches.get_many::<String>(id) else {
            continue;
        };
        let entries = indices
            .zip(names)
            .map(|(index, name)| (index, name.clone(), enabled));
        flagged.extend(entries);
    }
    flagged.sort_by_key(|(index, _, _)| *index);
    let mut toggles = IndexMap::new();
    for (_, name, enabled) in flagged {
        toggles.insert(name, enabled);
    }
    toggles
}

/// Split `module::param=value`; the value is read as YAML.
pub(crate) fn parse_override(raw: &str) -> Result<(String, String, Value)> {
    let invalid = || InstallerError::InvalidValues(format!("'{raw}' is not MODULE::PARAM=VALUE"));
    let (target, value) = raw.split_once('=').ok_or_else(invalid)?;
    let (module, param) = target.split_once("::").ok_or_else(invalid)?;
    if module.is_empty() || param.is_empty() {
        return Err(invalid());
    }
    let value = match serde_yaml::from_str::<Value>(value) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(value.to_string()),
    };
    Ok((module.to_string(), param.to_string(), value))
}

/// Run the installer and return the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
    let logging = logging::init(
        args.log_level.unwrap_or(LevelFilter::DEBUG),
        args.verbose.then_some(args.verbose_log_level),
    );
    let (out_tx, out_handle) = spawn_output_writer();
    let mut wizard = TerminalWizard::default();

    let result = run_controller(&args, &logging, &out_tx, &mut wizard).await;
    if let Err(e) = &result {
        tracing::error!("{e}");
    }

    drop(out_tx);
    let _ = out_handle.await;
    let _ = logging.file.flush();
    result
}
