//! Post-run processing utilities.
//!
//! Records the scenario as installed, exports the run summary and reports
//! the outcome after the provisioning run completes.

use crate::cli::Cli;
use crate::config::Configuration;
use crate::model::{RunResult, RunSummary};
use crate::scenario::ScenarioStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    /// Lines for stdout.
    pub messages: Vec<String>,
    /// Lines for stderr.
    pub errors: Vec<String>,
    pub linked: bool,
}

/// Only runs that persisted their answers and succeeded become the last scenario.
pub(crate) fn should_link(args: &Cli, run: &RunResult) -> bool {
    !args.temporary_answers() && run.succeeded()
}

/// Link the last scenario, export the summary and build the closing messages.
pub(crate) fn process_run_completion(
    args: &Cli,
    store: &ScenarioStore,
    config: &Configuration,
    run: &RunResult,
    log_path: Option<&Path>,
    elapsed: Duration,
) -> ProcessedRun {
    let linked = should_link(args, run) && link_scenario(store, config);

    let summary = build_summary(config, run, elapsed, args.noop);
    let mut messages = Vec::new();
    let mut errors = Vec::new();
    if run.succeeded() {
        messages.push("Success!".to_string());
    } else {
        let log = log_path
            .map(|p| format!(" Please check {} for details.", p.display()))
            .unwrap_or_default();
        errors.push(format!(
            "There were errors detected during the provisioning run (exit code {}).{log}",
            run.exit_code
        ));
    }
    if let Some(export_path) = args.export_json.as_deref() {
        match export_json(export_path, &summary) {
            Ok(()) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => errors.push(format!("Export JSON failed: {e:#}")),
        }
    }

    info!(
        "Installer finished in {} with exit code {} ({} errors, {} warnings)",
        humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
        run.exit_code,
        run.errors,
        run.warnings
    );
    ProcessedRun {
        messages,
        errors,
        linked,
    }
}

fn link_scenario(store: &ScenarioStore, config: &Configuration) -> bool {
    match store.link_last_scenario(config.config_file()) {
        Ok(()) => true,
        Err(e) => {
            let name = config.name();
            warn!("could not record {name} as the last scenario: {e}");
            false
        }
    }
}

fn build_summary(
    config: &Configuration,
    run: &RunResult,
    elapsed: Duration,
    noop: bool,
) -> RunSummary {
    RunSummary {
        timestamp_utc: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        scenario: config.name(),
        scenario_path: config.config_file().to_path_buf(),
        exit_code: run.exit_code,
        duration: elapsed,
        lines: run.lines,
        errors: run.errors,
        warnings: run.warnings,
        noop,
    }
}

fn export_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("serializing run summary")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
