//! Scenario discovery and the last-used scenario pointer.

use crate::config::{read_yaml_mapping, AppSettings};
use crate::error::Result;
use crate::model::Scenario;
use indexmap::IndexMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LAST_SCENARIO_LINK: &str = "last_scenario.yaml";
const SCENARIO_EXTENSION: &str = "yaml";

/// Parse a definition file. `Ok(None)` when it declares no answer file,
/// i.e. it is not a scenario.
pub fn parse_scenario(path: &Path) -> Result<Option<Scenario>> {
    let app = AppSettings::from_mapping(read_yaml_mapping(path)?);
    let Some(answer_file) = app.answer_file() else {
        return Ok(None);
    };
    let source_path = fs::canonicalize(path)?;
    // legacy definitions carry no name
    let name = app.name().map(str::to_string).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok(Some(Scenario {
        source_path,
        name,
        description: app.description().map(str::to_string),
        answer_file: answer_file.to_string(),
    }))
}

#[derive(Debug, Clone)]
pub struct ScenarioStore {
    config_dir: PathBuf,
    link_path: PathBuf,
    previous: Option<PathBuf>,
}

impl ScenarioStore {
    /// `config` may be the scenario directory or a file inside it.
    pub fn new(config: &Path) -> Self {
        let config_dir = if config.is_file() {
            config
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            config.to_path_buf()
        };
        let link_path = config_dir.join(LAST_SCENARIO_LINK);
        let previous = resolve_pointer(&link_path);
        Self {
            config_dir,
            link_path,
            previous,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    /// Definition path for a scenario requested by name.
    pub fn scenario_path(&self, name: &str) -> PathBuf {
        if has_scenario_extension(Path::new(name)) {
            self.config_dir.join(name)
        } else {
            self.config_dir.join(format!("{name}.{SCENARIO_EXTENSION}"))
        }
    }

    /// Every scenario in the directory keyed by canonical path, sorted by path.
    /// Unreadable or malformed files are skipped with a warning.
    pub fn list_scenarios(&self) -> IndexMap<PathBuf, Scenario> {
        let entries = match fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "cannot read scenario directory {}: {e}",
                    self.config_dir.display()
                );
                return IndexMap::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| has_scenario_extension(p))
            .filter(|p| p.file_name() != self.link_path.file_name())
            .collect();
        files.sort();

        let mut scenarios = IndexMap::new();
        for file in files {
            match parse_scenario(&file) {
                Ok(Some(scenario)) => {
                    scenarios.insert(scenario.source_path.clone(), scenario);
                }
                Ok(None) => debug!("{} is not a scenario definition", file.display()),
                Err(e) => warn!("skipping {}: {e}", file.display()),
            }
        }
        scenarios
    }

    /// Canonical path of the last used scenario, if the pointer resolves.
    pub fn previous_scenario_path(&self) -> Option<&Path> {
        self.previous.as_deref()
    }

    pub fn previous_scenario(&self) -> Option<Scenario> {
        let path = self.previous.as_deref()?;
        match parse_scenario(path) {
            Ok(scenario) => scenario,
            Err(e) => {
                warn!("previous scenario {} is unreadable: {e}", path.display());
                None
            }
        }
    }

    /// Point the last-scenario link at `scenario`, replacing it atomically.
    pub fn link_last_scenario(&self, scenario: &Path) -> io::Result<()> {
        let target = fs::canonicalize(scenario)?;
        let staging = self
            .config_dir
            .join(format!(".{LAST_SCENARIO_LINK}.{}", std::process::id()));
        match fs::remove_file(&staging) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        symlink(&target, &staging)?;
        if let Err(e) = fs::rename(&staging, &self.link_path) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        debug!(
            "{} now points at {}",
            self.link_path.display(),
            target.display()
        );
        Ok(())
    }
}

fn has_scenario_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SCENARIO_EXTENSION)
}

/// The pointer only counts when it leads to a readable scenario definition.
fn resolve_pointer(link: &Path) -> Option<PathBuf> {
    let target = fs::canonicalize(link).ok()?;
    match parse_scenario(&target) {
        Ok(Some(_)) => Some(target),
        Ok(None) => {
            warn!("ignoring {}: not a scenario definition", link.display());
            None
        }
        Err(e) => {
            warn!("ignoring {}: {e}", link.display());
            None
        }
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    fs::copy(target, link).map(|_| ())
}
