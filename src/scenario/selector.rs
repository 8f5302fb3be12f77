//! Chooses the scenario for a run and gates scenario changes.
//!
//! Resolution order: explicit `--scenario`, the last-used pointer, the only
//! available scenario, then the interactive wizard. A change away from the
//! last-used scenario must be compared (`--compare-scenarios`), forced
//! (`--force`) or confirmed interactively; otherwise the run is blocked.

use super::store::ScenarioStore;
use crate::config::{diff::diff, Configuration};
use crate::error::{InstallerError, Result};
use crate::text_summary::build_scenario_diff;
use crate::wizard::{Wizard, WizardChoice};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The subset of command-line flags that drive selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionFlags {
    pub scenario: Option<String>,
    pub force: bool,
    pub compare: bool,
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Selected(PathBuf),
    Cancelled,
}

/// Result of gating a (possible) scenario change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeGate {
    Proceed,
    /// Stop before provisioning. The lines, if any, are the rendered comparison.
    Exit { code: i32, report: Vec<String> },
}

pub struct ScenarioSelector<'a> {
    store: &'a ScenarioStore,
    flags: &'a SelectionFlags,
}

impl<'a> ScenarioSelector<'a> {
    pub fn new(store: &'a ScenarioStore, flags: &'a SelectionFlags) -> Self {
        Self { store, flags }
    }

    pub fn resolve(&self, wizard: &mut dyn Wizard) -> Result<Resolution> {
        if let Some(path) = self.scenario_from_args()? {
            return Ok(Resolution::Selected(path));
        }
        if let Some(previous) = self.store.previous_scenario_path() {
            return Ok(Resolution::Selected(previous.to_path_buf()));
        }
        let available = self.store.list_scenarios();
        if available.len() == 1 {
            if let Some((path, _)) = available.first() {
                return Ok(Resolution::Selected(path.clone()));
            }
        }
        if self.flags.interactive {
            return match wizard.select_scenario(&available)? {
                WizardChoice::Picked(path) => Ok(Resolution::Selected(path)),
                WizardChoice::Cancel => {
                    info!("Installation was cancelled by user");
                    Ok(Resolution::Cancelled)
                }
            };
        }
        Err(InstallerError::ScenarioNotSelected)
    }

    fn scenario_from_args(&self) -> Result<Option<PathBuf>> {
        let Some(name) = self.flags.scenario.as_deref() else {
            return Ok(None);
        };
        let path = self.store.scenario_path(name);
        if !path.is_file() {
            return Err(InstallerError::UnknownScenario(path));
        }
        Ok(Some(fs::canonicalize(&path)?))
    }

    /// True iff a previous scenario exists and differs from `scenario`.
    pub fn scenario_changed(&self, scenario: &Path) -> bool {
        let resolved = fs::canonicalize(scenario).unwrap_or_else(|_| scenario.to_path_buf());
        self.store
            .previous_scenario_path()
            .is_some_and(|previous| previous != resolved)
    }

    pub fn check_scenario_change(
        &self,
        scenario: &Path,
        wizard: &mut dyn Wizard,
    ) -> Result<ChangeGate> {
        if !self.scenario_changed(scenario) {
            return Ok(ChangeGate::Proceed);
        }
        if self.flags.compare {
            return Ok(ChangeGate::Exit {
                code: 0,
                report: self.scenario_diff(scenario)?,
            });
        }
        let gate = self.confirm_scenario_change(scenario, wizard)?;
        if gate == ChangeGate::Proceed {
            info!("Scenario {} was selected", scenario.display());
        }
        Ok(gate)
    }

    pub fn confirm_scenario_change(
        &self,
        scenario: &Path,
        wizard: &mut dyn Wizard,
    ) -> Result<ChangeGate> {
        if self.flags.force {
            return Ok(ChangeGate::Proceed);
        }
        if !self.flags.interactive {
            return Err(InstallerError::ScenarioChangeBlocked);
        }
        let overview = self.scenario_diff(scenario)?;
        match wizard.confirm_scenario_change(&overview)? {
            WizardChoice::Picked(()) => Ok(ChangeGate::Proceed),
            WizardChoice::Cancel => {
                info!("Installation was cancelled by user");
                Ok(ChangeGate::Exit {
                    code: 0,
                    report: Vec::new(),
                })
            }
        }
    }

    fn scenario_diff(&self, scenario: &Path) -> Result<Vec<String>> {
        let previous = self
            .store
            .previous_scenario_path()
            .ok_or(InstallerError::ScenarioNotSelected)?;
        info!("Scenarios are being compared, that may take a while...");
        let prev_conf = Configuration::load(previous)?;
        let new_conf = Configuration::load(scenario)?;
        let d = diff(&prev_conf, &new_conf);
        if d.is_empty() {
            let (prev, new) = (prev_conf.name(), new_conf.name());
            info!("{prev} and {new} configure the same modules");
        }
        Ok(build_scenario_diff(&prev_conf, &new_conf, &d).lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::write_scenario;
    use crate::wizard::ScriptedWizard;
    use pretty_assertions::assert_eq;

    struct Fixture {
        dir: tempfile::TempDir,
        a: PathBuf,
        b: PathBuf,
    }

    /// Two scenarios, `a` recorded as the last one used.
    fn installed_a() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let a = write_scenario(dir.path(), "a", "", "web:\n  port: 80\n");
        let b = write_scenario(dir.path(), "b", "", "web:\n  port: 81\n");
        let store = ScenarioStore::new(dir.path());
        store.link_last_scenario(&a).unwrap();
        let a = fs::canonicalize(a).unwrap();
        let b = fs::canonicalize(b).unwrap();
        Fixture { dir, a, b }
    }

    fn flags(scenario: Option<&str>) -> SelectionFlags {
        SelectionFlags {
            scenario: scenario.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn explicit_scenario_wins_and_resolution_is_idempotent() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(Some("b"));
        let selector = ScenarioSelector::new(&store, &f);
        let mut wizard = ScriptedWizard::default();
        let first = selector.resolve(&mut wizard).unwrap();
        let second = selector.resolve(&mut wizard).unwrap();
        assert_eq!(first, Resolution::Selected(fx.b.clone()));
        assert_eq!(first, second);
        assert_eq!(wizard.selections_asked, 0);
    }

    #[test]
    fn unknown_explicit_scenario_fails() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(Some("zzz"));
        let err = ScenarioSelector::new(&store, &f)
            .resolve(&mut ScriptedWizard::default())
            .unwrap_err();
        assert!(matches!(err, InstallerError::UnknownScenario(_)));
        assert_eq!(err.exit_code(), 29);
    }

    #[test]
    fn falls_back_to_previous_then_sole_scenario() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(None);
        let got = ScenarioSelector::new(&store, &f)
            .resolve(&mut ScriptedWizard::default())
            .unwrap();
        assert_eq!(got, Resolution::Selected(fx.a.clone()));

        let solo = tempfile::tempdir().unwrap();
        let only = write_scenario(solo.path(), "only", "", "x: true\n");
        let only = fs::canonicalize(only).unwrap();
        let store = ScenarioStore::new(solo.path());
        let got = ScenarioSelector::new(&store, &f)
            .resolve(&mut ScriptedWizard::default())
            .unwrap();
        assert_eq!(got, Resolution::Selected(only));
    }

    #[cfg(unix)]
    #[test]
    fn a_pointer_to_a_non_scenario_falls_through_to_the_sole_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let only = write_scenario(dir.path(), "only", "", "x: true\n");
        let notes = dir.path().join("notes.yaml");
        fs::write(&notes, "name: just notes\n").unwrap();
        let link = dir.path().join(crate::scenario::store::LAST_SCENARIO_LINK);
        std::os::unix::fs::symlink(&notes, &link).unwrap();

        let store = ScenarioStore::new(dir.path());
        let f = flags(None);
        let got = ScenarioSelector::new(&store, &f)
            .resolve(&mut ScriptedWizard::default())
            .unwrap();
        assert_eq!(got, Resolution::Selected(fs::canonicalize(only).unwrap()));
    }

    #[test]
    fn ambiguous_choice_needs_the_wizard() {
        let dir = tempfile::tempdir().unwrap();
        let one = write_scenario(dir.path(), "one", "", "x: true\n");
        write_scenario(dir.path(), "two", "", "x: true\n");
        let store = ScenarioStore::new(dir.path());

        let f = flags(None);
        let err = ScenarioSelector::new(&store, &f)
            .resolve(&mut ScriptedWizard::default())
            .unwrap_err();
        assert!(matches!(err, InstallerError::ScenarioNotSelected));

        let f = SelectionFlags {
            interactive: true,
            ..Default::default()
        };
        let selector = ScenarioSelector::new(&store, &f);
        let mut cancel = ScriptedWizard::default();
        let got = selector.resolve(&mut cancel).unwrap();
        assert_eq!(got, Resolution::Cancelled);
        assert_eq!(cancel.selections_asked, 1);

        let mut pick = ScriptedWizard {
            selection: Some(WizardChoice::Picked(one.clone())),
            ..Default::default()
        };
        let got = selector.resolve(&mut pick).unwrap();
        assert_eq!(got, Resolution::Selected(one));
    }

    #[test]
    fn change_detection_compares_canonical_paths() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(None);
        let selector = ScenarioSelector::new(&store, &f);
        assert!(!selector.scenario_changed(&fx.a));
        assert!(!selector.scenario_changed(&fx.dir.path().join("./a.yaml")));
        assert!(selector.scenario_changed(&fx.b));

        let fresh = tempfile::tempdir().unwrap();
        let c = write_scenario(fresh.path(), "c", "", "x: true\n");
        let store = ScenarioStore::new(fresh.path());
        assert!(!ScenarioSelector::new(&store, &f).scenario_changed(&c));
    }

    #[test]
    fn force_skips_confirmation_entirely() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = SelectionFlags {
            force: true,
            interactive: true,
            ..Default::default()
        };
        let mut wizard = ScriptedWizard::default();
        let gate = ScenarioSelector::new(&store, &f)
            .confirm_scenario_change(&fx.b, &mut wizard)
            .unwrap();
        assert_eq!(gate, ChangeGate::Proceed);
        assert!(wizard.confirmations_asked.is_empty());
    }

    #[test]
    fn non_interactive_change_is_blocked() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(Some("b"));
        let err = ScenarioSelector::new(&store, &f)
            .check_scenario_change(&fx.b, &mut ScriptedWizard::default())
            .unwrap_err();
        assert!(matches!(err, InstallerError::ScenarioChangeBlocked));
        assert_eq!(err.exit_code(), 30);
    }

    #[test]
    fn interactive_change_shows_the_diff_then_asks() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = SelectionFlags {
            interactive: true,
            ..Default::default()
        };
        let selector = ScenarioSelector::new(&store, &f);

        let mut decline = ScriptedWizard::default();
        let gate = selector.check_scenario_change(&fx.b, &mut decline).unwrap();
        assert_eq!(
            gate,
            ChangeGate::Exit {
                code: 0,
                report: Vec::new()
            }
        );
        let shown = decline.confirmations_asked[0].join("\n");
        assert!(shown.contains("web::port: 81 -> 80"));

        let mut accept = ScriptedWizard {
            confirmation: Some(WizardChoice::Picked(())),
            ..Default::default()
        };
        assert_eq!(
            selector.check_scenario_change(&fx.b, &mut accept).unwrap(),
            ChangeGate::Proceed
        );
    }

    #[test]
    fn compare_reports_and_exits_without_prompting() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = SelectionFlags {
            compare: true,
            ..Default::default()
        };
        let mut wizard = ScriptedWizard::default();
        let gate = ScenarioSelector::new(&store, &f)
            .check_scenario_change(&fx.b, &mut wizard)
            .unwrap();
        match gate {
            ChangeGate::Exit { code, report } => {
                assert_eq!(code, 0);
                assert!(report.iter().any(|l| l.contains("Overview of modules")));
            }
            other => panic!("unexpected gate {other:?}"),
        }
        assert!(wizard.confirmations_asked.is_empty());
    }

    #[test]
    fn unchanged_scenario_proceeds_silently() {
        let fx = installed_a();
        let store = ScenarioStore::new(fx.dir.path());
        let f = flags(None);
        let gate = ScenarioSelector::new(&store, &f)
            .check_scenario_change(&fx.a, &mut ScriptedWizard::default())
            .unwrap();
        assert_eq!(gate, ChangeGate::Proceed);
    }
}
