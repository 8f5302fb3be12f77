use crate::config::AppSettings;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Options always passed to the provisioning tool.
pub const PROVISION_OPTIONS: &[&str] = &[
    "--verbose",
    "--debug",
    "--trace",
    "--color=false",
    "--show_diff",
    "--detailed-exitcodes",
];

/// Environment variable naming the answers file for the child.
pub const ANSWER_FILE_ENV: &str = "INSTALLER_ANSWER_FILE";

#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub noop: bool,
    pub profile: bool,
}

/// The provisioning command line, detached from `std::process::Command` so
/// it can be logged and compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ProvisionCommand {
    pub fn build(app: &AppSettings, answers: &Path, flags: RunFlags) -> Self {
        let mut base = app.provision_command().into_iter();
        let program = base.next().unwrap_or_else(|| "puppet".to_string());
        let mut args: Vec<String> = base.collect();

        args.push("--execute".into());
        args.push(app.entry_directive().to_string());
        args.extend(PROVISION_OPTIONS.iter().map(|s| s.to_string()));
        if flags.noop {
            args.push("--noop".into());
        }
        if flags.profile {
            args.push("--profile".into());
        }
        let module_dirs = app.module_dirs();
        if !module_dirs.is_empty() {
            args.push("--modulepath".into());
            args.push(module_dirs.join(":"));
        }

        Self {
            program,
            args,
            env: vec![(ANSWER_FILE_ENV.to_string(), answers.display().to_string())],
        }
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

impl fmt::Display for ProvisionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}
