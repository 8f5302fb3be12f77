use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named configuration preset backed by a definition file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Canonicalized path of the definition file; the scenario's identity.
    pub source_path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub answer_file: String,
}

impl Scenario {
    /// File stem of the definition, which is what `--scenario` accepts.
    pub fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
}

/// One line of provisioning output tagged with a severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub severity: Severity,
    pub message: String,
}

/// How the child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Code(i32),
    Signal(i32),
}

impl ExitState {
    /// Shell convention: signals are reported as 128 + signal number.
    pub fn code(self) -> i32 {
        match self {
            ExitState::Code(c) => c,
            ExitState::Signal(s) => 128 + s,
        }
    }
}

/// Outcome of one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub lines: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl RunResult {
    pub fn record(&mut self, line: &ClassifiedLine) {
        self.lines += 1;
        match line.severity {
            Severity::Error => self.errors += 1,
            Severity::Warn => self.warnings += 1,
            Severity::Info | Severity::Debug => {}
        }
    }

    /// `--detailed-exitcodes`: 0 is "no changes", 2 is "changes applied".
    pub fn succeeded(&self) -> bool {
        matches!(self.exit_code, 0 | 2)
    }
}

/// Serializable record of a finished run, written by `--export-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp_utc: String,
    pub scenario: String,
    pub scenario_path: PathBuf,
    pub exit_code: i32,
    #[serde(with = "humantime_serde")]
    pub duration: std::time::Duration,
    pub lines: usize,
    pub errors: usize,
    pub warnings: usize,
    pub noop: bool,
}
