//! Configuration snapshots.
//!
//! A snapshot is a scenario's app settings (the definition file) plus the
//! modules and parameters found in its answer file, with scenario-declared
//! defaults applied. Snapshots are loaded independently and never share state.

pub mod diff;

use crate::error::{InstallerError, Result};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_DIR: &str = "/var/log/scenario-installer";
pub const DEFAULT_LOG_NAME: &str = "installer.log";
pub const DEFAULT_ENTRY_DIRECTIVE: &str = "include installer_configure";
pub const DEFAULT_PROVISION_COMMAND: &[&str] = &["puppet", "apply"];

/// App keys carried over from the previous scenario on migration.
const MIGRATED_KEYS: &[&str] = &[
    "log_dir",
    "log_name",
    "log_level",
    "module_dirs",
    "checks_dir",
    "colors",
];

/// Keys a scenario keeps for itself when migrating.
pub const MIGRATED_SKIP: &[&str] = &["log_name"];

/// Read a YAML file that must hold a mapping. An empty file is an empty mapping.
pub(crate) fn read_yaml_mapping(path: &Path) -> Result<Mapping> {
    let raw = fs::read_to_string(path)?;
    match serde_yaml::from_str::<Value>(&raw)? {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => Err(InstallerError::config(path, "expected a YAML mapping")),
    }
}

/// Keys may be written symbol-style (`:name`); the leading colon is dropped.
pub(crate) fn normalize_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.strip_prefix(':').unwrap_or(s).to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Render a value on one line for overviews and logs.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "UNDEF".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => match serde_json::to_string(other) {
            Ok(json) => json,
            Err(_) => format!("{other:?}"),
        },
    }
}

/// Scenario-level settings keyed by normalized name, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSettings(IndexMap<String, Value>);

impl AppSettings {
    pub fn from_mapping(mapping: Mapping) -> Self {
        let entries = mapping
            .into_iter()
            .filter_map(|(k, v)| normalize_key(&k).map(|k| (k, v)))
            .collect();
        Self(entries)
    }

    pub fn to_mapping(&self) -> Mapping {
        self.0
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) {
        self.0.shift_remove(key);
    }

    pub fn name(&self) -> Option<&str> {
        self.str("name")
    }

    pub fn description(&self) -> Option<&str> {
        self.str("description")
    }

    pub fn answer_file(&self) -> Option<&str> {
        self.str("answer_file")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(self.str("log_dir").unwrap_or(DEFAULT_LOG_DIR))
    }

    pub fn log_name(&self) -> &str {
        self.str("log_name").unwrap_or(DEFAULT_LOG_NAME)
    }

    pub fn checks_dir(&self) -> Option<PathBuf> {
        self.str("checks_dir").map(PathBuf::from)
    }

    pub fn provision_command(&self) -> Vec<String> {
        let configured = self.strings("provision_command");
        if configured.is_empty() {
            DEFAULT_PROVISION_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            configured
        }
    }

    pub fn entry_directive(&self) -> &str {
        self.str("entry_directive")
            .unwrap_or(DEFAULT_ENTRY_DIRECTIVE)
    }

    pub fn module_dirs(&self) -> Vec<String> {
        self.strings("module_dirs")
    }

    /// `section -> module -> param -> value` lookups (`defaults`, `documentation`).
    fn nested(&self, section: &str, module: &str, param: &str) -> Option<&Value> {
        let modules = self.get(section)?.as_mapping()?;
        let params = modules
            .iter()
            .find(|(k, _)| normalize_key(k).as_deref() == Some(module))?
            .1
            .as_mapping()?;
        params
            .iter()
            .find(|(k, _)| normalize_key(k).as_deref() == Some(param))
            .map(|(_, v)| v)
    }

    fn default_params(&self, module: &str) -> Vec<(String, Value)> {
        let Some(modules) = self.get("defaults").and_then(Value::as_mapping) else {
            return Vec::new();
        };
        modules
            .iter()
            .filter(|(k, _)| normalize_key(k).as_deref() == Some(module))
            .filter_map(|(_, v)| v.as_mapping())
            .flat_map(|params| params.iter())
            .filter_map(|(k, v)| normalize_key(k).map(|k| (k, v.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub module: String,
    pub name: String,
    pub value: Option<Value>,
    /// Whether the value came from an explicit answer rather than a default.
    pub value_set: bool,
    pub doc: Option<String>,
}

impl Parameter {
    fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            value: None,
            value_set: false,
            doc: None,
        }
    }

    pub fn multivalued(&self) -> bool {
        matches!(self.value, Some(Value::Sequence(_)))
    }

    pub fn identifier(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub enabled: bool,
    pub params: IndexMap<String, Parameter>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    config_file: PathBuf,
    app: AppSettings,
    answer_file: PathBuf,
    modules: IndexMap<String, Module>,
}

impl Configuration {
    /// Load the definition at `config_file` and the answer file it references.
    pub fn load(config_file: &Path) -> Result<Self> {
        let app = AppSettings::from_mapping(read_yaml_mapping(config_file)?);
        let Some(answer_ref) = app.answer_file() else {
            return Err(InstallerError::config(
                config_file,
                "no answer_file declared",
            ));
        };
        let answer_file = resolve_relative(config_file, answer_ref);
        if !answer_file.is_file() {
            return Err(InstallerError::NoAnswerFile(answer_file));
        }

        let mut modules = IndexMap::new();
        for (key, entry) in read_yaml_mapping(&answer_file)? {
            let Some(name) = normalize_key(&key) else {
                return Err(InstallerError::config(
                    &answer_file,
                    "module names must be scalars",
                ));
            };
            let (enabled, answered) = match entry {
                Value::Bool(b) => (b, Mapping::new()),
                Value::Null => (true, Mapping::new()),
                Value::Mapping(m) => (true, m),
                _ => {
                    return Err(InstallerError::config(
                        &answer_file,
                        format!("module '{name}' must be true, false or a mapping"),
                    ))
                }
            };

            let mut params: IndexMap<String, Parameter> = IndexMap::new();
            for (param, default) in app.default_params(&name) {
                let entry = params
                    .entry(param.clone())
                    .or_insert_with(|| Parameter::new(&name, &param));
                entry.value = non_null(default);
            }
            for (k, v) in answered {
                let Some(param) = normalize_key(&k) else {
                    continue;
                };
                let entry = params
                    .entry(param.clone())
                    .or_insert_with(|| Parameter::new(&name, &param));
                entry.value = non_null(v);
                entry.value_set = true;
            }
            for p in params.values_mut() {
                p.doc = app
                    .nested("documentation", &name, &p.name)
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }

            modules.insert(
                name.clone(),
                Module {
                    name,
                    enabled,
                    params,
                },
            );
        }

        Ok(Self {
            config_file: config_file.to_path_buf(),
            app,
            answer_file,
            modules,
        })
    }

    /// Load a fresh snapshot from the same definition file.
    pub fn reload(&self) -> Result<Self> {
        Self::load(&self.config_file)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn app(&self) -> &AppSettings {
        &self.app
    }

    pub fn answer_file(&self) -> &Path {
        &self.answer_file
    }

    pub fn name(&self) -> String {
        self.app.name().map(str::to_string).unwrap_or_else(|| {
            self.config_file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn param(&self, module: &str, name: &str) -> Option<&Parameter> {
        self.modules.get(module)?.params.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = &Parameter> {
        self.modules.values().flat_map(|m| m.params.values())
    }

    pub fn set_module_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let module = self
            .modules
            .get_mut(name)
            .ok_or_else(|| InstallerError::UnknownModule(name.to_string()))?;
        module.enabled = enabled;
        Ok(())
    }

    /// A scalar given for a multi-valued parameter becomes a one-element list.
    pub fn set_param(&mut self, module: &str, name: &str, value: Value) -> Result<()> {
        let m = self
            .modules
            .get_mut(module)
            .ok_or_else(|| InstallerError::UnknownModule(module.to_string()))?;
        let p = m.params.get_mut(name).ok_or_else(|| {
            InstallerError::InvalidValues(format!("unknown parameter {module}::{name}"))
        })?;
        let value = match value {
            Value::Sequence(_) | Value::Null => value,
            scalar if p.multivalued() => Value::Sequence(vec![scalar]),
            scalar => scalar,
        };
        p.value = non_null(value);
        p.value_set = true;
        Ok(())
    }

    /// Answers as stored on disk: enabled modules map to their parameter
    /// values, disabled modules to `false`.
    pub fn answers(&self) -> Mapping {
        self.modules
            .values()
            .map(|m| {
                let entry = if !m.enabled {
                    Value::Bool(false)
                } else if m.params.is_empty() {
                    Value::Bool(true)
                } else {
                    Value::Mapping(
                        m.params
                            .values()
                            .map(|p| {
                                (
                                    Value::String(p.name.clone()),
                                    p.value.clone().unwrap_or(Value::Null),
                                )
                            })
                            .collect(),
                    )
                };
                (Value::String(m.name.clone()), entry)
            })
            .collect()
    }

    pub fn store_answers(&self, target: &Path) -> Result<()> {
        write_yaml(target, &Value::Mapping(self.answers()))
    }

    /// Write the answers to a file the caller already opened.
    pub fn write_answers(&self, out: impl io::Write) -> Result<()> {
        serde_yaml::to_writer(out, &Value::Mapping(self.answers()))?;
        Ok(())
    }

    /// Rewrite the definition file with the current app settings.
    pub fn save_app_settings(&self) -> Result<()> {
        write_yaml(&self.config_file, &Value::Mapping(self.app.to_mapping()))
    }

    /// Carry app settings (except `skip`) and answers over from `previous`.
    /// Both are persisted; reload afterwards to observe the result.
    pub fn migrate_from(&mut self, previous: &Configuration, skip: &[&str]) -> Result<()> {
        for key in MIGRATED_KEYS.iter().filter(|k| !skip.contains(k)) {
            match previous.app.get(key) {
                Some(v) => self.app.set(key, v.clone()),
                None => self.app.remove(key),
            }
        }
        self.save_app_settings()?;
        previous.store_answers(&self.answer_file)
    }

    /// Unanswered parameters take the explicit answers of `previous`.
    pub fn preset_defaults_from(&mut self, previous: &Configuration) {
        for module in self.modules.values_mut() {
            for p in module.params.values_mut().filter(|p| !p.value_set) {
                if let Some(prev) = previous.param(&p.module, &p.name) {
                    if prev.value_set && prev.value.is_some() {
                        p.value = prev.value.clone();
                    }
                }
            }
        }
    }
}

fn non_null(v: Value) -> Option<Value> {
    match v {
        Value::Null => None,
        v => Some(v),
    }
}

fn resolve_relative(config_file: &Path, reference: &str) -> PathBuf {
    let path = PathBuf::from(reference);
    if path.is_absolute() {
        return path;
    }
    config_file
        .parent()
        .map(|dir| dir.join(&path))
        .unwrap_or(path)
}

fn write_yaml(target: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, serde_yaml::to_string(value)?)?;
    Ok(())
}
