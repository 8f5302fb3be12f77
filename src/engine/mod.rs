pub mod child;
pub mod classify;
pub mod command;

use crate::logging::PROVISION_TARGET;
use crate::model::{ClassifiedLine, ExitState, RunResult, Severity};
use crate::progress::ProgressSink;
use child::{ProvisionChild, Reap};
use classify::classify_line;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use child::PtyChild;
pub use command::{ProvisionCommand, RunFlags};

/// Drives one provisioning child to completion.
pub struct ProcessRunner {
    temp_artifact: Option<PathBuf>,
}

impl ProcessRunner {
    /// `temp_artifact` is removed once the run is over, whatever the outcome.
    pub fn new(temp_artifact: Option<PathBuf>) -> Self {
        Self { temp_artifact }
    }

    pub fn run<C: ProvisionChild>(
        &self,
        mut child: C,
        progress: &mut dyn ProgressSink,
    ) -> RunResult {
        let finish = Finish {
            progress,
            temp_artifact: self.temp_artifact.as_deref(),
        };
        let mut result = RunResult::default();

        for line in child.lines() {
            match line {
                Ok(raw) => {
                    let classified = classify_line(&raw);
                    log_line(&classified);
                    if classified.severity == Severity::Error {
                        finish.progress.print_error(&classified.message);
                    }
                    finish.progress.update(&raw);
                    result.record(&classified);
                }
                Err(e) => {
                    warn!("reading provisioning output failed: {e}");
                    break;
                }
            }
        }

        let status = match child.check() {
            Reap::Exited(state) => Some(state),
            Reap::Running => match child.wait() {
                Reap::Exited(state) => Some(state),
                Reap::Running | Reap::AlreadyReaped => None,
            },
            Reap::AlreadyReaped => None,
        };
        if status.is_none() {
            debug!("provisioning exit status was collected elsewhere");
        }
        result.exit_code = status.map_or(0, ExitState::code);
        result
    }
}

/// Runs the end-of-run steps on drop so they happen on every exit path.
struct Finish<'a> {
    progress: &'a mut dyn ProgressSink,
    temp_artifact: Option<&'a Path>,
}

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        self.progress.close();
        info!("Provisioning process finished");
        if let Some(path) = self.temp_artifact {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }
    }
}

fn log_line(line: &ClassifiedLine) {
    let message = &line.message;
    match line.severity {
        Severity::Error => error!(target: PROVISION_TARGET, "{message}"),
        Severity::Warn => warn!(target: PROVISION_TARGET, "{message}"),
        Severity::Info => info!(target: PROVISION_TARGET, "{message}"),
        Severity::Debug => debug!(target: PROVISION_TARGET, "{message}"),
    }
}
