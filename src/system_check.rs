use crate::error::{InstallerError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

/// Run every executable in `checks_dir`, in name order. All checks run even
/// after a failure so every problem is logged.
pub fn run_checks(checks_dir: &Path) -> Result<()> {
    let checks = executables(checks_dir)?;
    if checks.is_empty() {
        debug!("no system checks in {}", checks_dir.display());
        return Ok(());
    }

    let mut failed = 0;
    for check in &checks {
        debug!("running system check {}", check.display());
        match Command::new(check).output() {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                failed += 1;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!(
                    "System check {} failed ({}): {}",
                    check.display(),
                    output.status,
                    format!("{} {}", stdout.trim(), stderr.trim()).trim()
                );
            }
            Err(e) => {
                failed += 1;
                error!("System check {} could not run: {e}", check.display());
            }
        }
    }

    if failed > 0 {
        return Err(InstallerError::InvalidSystem);
    }
    info!("{} system checks passed", checks.len());
    Ok(())
}

fn executables(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut found = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if is_executable(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
