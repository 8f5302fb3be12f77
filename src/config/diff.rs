//! Three-way comparison between two configuration snapshots.

use super::{Configuration, Parameter};
use indexmap::IndexMap;
use serde_yaml::Value;

/// A parameter of the current snapshot whose value differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedParameter {
    pub param: Parameter,
    pub previous_value: Option<Value>,
}

/// Enabled state of a module in both snapshots; `None` means absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleStatusDelta {
    pub previous: Option<bool>,
    pub current: Option<bool>,
}

impl ModuleStatusDelta {
    pub fn is_change(&self) -> bool {
        self.previous != self.current
    }

    /// Enabled before, disabled or gone now.
    pub fn is_disabling(&self) -> bool {
        self.previous == Some(true) && self.current != Some(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationDiff {
    /// Explicitly set values of `previous` with no counterpart in `current`.
    pub missing: Vec<Parameter>,
    pub changed: Vec<ChangedParameter>,
    pub modules: IndexMap<String, ModuleStatusDelta>,
}

impl ConfigurationDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
            && self.changed.is_empty()
            && !self.modules.values().any(ModuleStatusDelta::is_change)
    }
}

/// Compare `previous` against `current`. Neither input is modified.
pub fn diff(previous: &Configuration, current: &Configuration) -> ConfigurationDiff {
    let missing = previous
        .modules()
        .filter(|m| m.enabled)
        .flat_map(|m| m.params.values())
        .filter(|p| p.value_set && p.value.is_some())
        .filter(|p| current.param(&p.module, &p.name).is_none())
        .cloned()
        .collect();

    let changed = current
        .modules()
        .filter(|m| m.enabled)
        .flat_map(|m| m.params.values())
        .filter_map(|p| {
            let old = previous.param(&p.module, &p.name)?;
            (old.value != p.value).then(|| ChangedParameter {
                param: p.clone(),
                previous_value: old.value.clone(),
            })
        })
        .collect();

    let mut modules: IndexMap<String, ModuleStatusDelta> = IndexMap::new();
    for m in previous.modules() {
        modules.entry(m.name.clone()).or_default().previous = Some(m.enabled);
    }
    for m in current.modules() {
        modules.entry(m.name.clone()).or_default().current = Some(m.enabled);
    }

    ConfigurationDiff {
        missing,
        changed,
        modules,
    }
}
