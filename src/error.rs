//! Installer error taxonomy and the symbolic exit codes it maps to.

use std::path::PathBuf;
use thiserror::Error;

/// Symbolic exit codes shared by every fatal path.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const INVALID_SYSTEM: i32 = 20;
    pub const INVALID_VALUES: i32 = 21;
    pub const NO_ANSWER_FILE: i32 = 23;
    pub const UNKNOWN_MODULE: i32 = 24;
    pub const UNKNOWN_SCENARIO: i32 = 29;
    pub const SCENARIO_ERROR: i32 = 30;
}

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error(
        "Scenario ({}) was not found, can not continue. \
         Use --list-scenarios to list available options.",
        .0.display()
    )]
    UnknownScenario(PathBuf),
    #[error(
        "Scenario was not selected, can not continue. \
         Use --list-scenarios to list available options."
    )]
    ScenarioNotSelected,
    #[error(
        "You are trying to replace existing installation with different scenario. \
         This may lead to unpredictable states. Use --force to override. \
         You can use --compare-scenarios to see the differences"
    )]
    ScenarioChangeBlocked,
    #[error("Unknown module '{0}'")]
    UnknownModule(String),
    #[error("Invalid value: {0}")]
    InvalidValues(String),
    #[error("Your system does not meet configuration criteria")]
    InvalidSystem,
    #[error("No answer file found at {}", .0.display())]
    NoAnswerFile(PathBuf),
    #[error("Invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
    #[error("failed to spawn provisioning command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl InstallerError {
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        InstallerError::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Exit code the process terminates with when this error is fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallerError::UnknownScenario(_) | InstallerError::ScenarioNotSelected => {
                exit_code::UNKNOWN_SCENARIO
            }
            InstallerError::ScenarioChangeBlocked => exit_code::SCENARIO_ERROR,
            InstallerError::UnknownModule(_) => exit_code::UNKNOWN_MODULE,
            InstallerError::InvalidValues(_) => exit_code::INVALID_VALUES,
            InstallerError::InvalidSystem => exit_code::INVALID_SYSTEM,
            InstallerError::NoAnswerFile(_) => exit_code::NO_ANSWER_FILE,
            InstallerError::Config { .. }
            | InstallerError::Spawn { .. }
            | InstallerError::Io(_)
            | InstallerError::Yaml(_)
            | InstallerError::Prompt(_) => exit_code::GENERIC,
        }
    }
}

pub type Result<T, E = InstallerError> = std::result::Result<T, E>;
