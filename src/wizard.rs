//! Interactive prompts used while choosing or confirming a scenario.

use crate::error::Result;
use crate::model::Scenario;
use dialoguer::console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indexmap::IndexMap;
use std::path::PathBuf;

/// What the user picked; `Cancel` ends the run cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardChoice<T> {
    Picked(T),
    Cancel,
}

pub trait Wizard {
    /// Offer every scenario plus a cancel entry.
    fn select_scenario(
        &mut self,
        scenarios: &IndexMap<PathBuf, Scenario>,
    ) -> Result<WizardChoice<PathBuf>>;

    /// Show `overview` and ask whether to proceed with a scenario change.
    fn confirm_scenario_change(&mut self, overview: &[String]) -> Result<WizardChoice<()>>;
}

/// Terminal prompts on stdout.
pub struct TerminalWizard {
    term: Term,
    theme: ColorfulTheme,
}

impl Default for TerminalWizard {
    fn default() -> Self {
        Self {
            term: Term::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl TerminalWizard {
    fn header(&self, title: &str, description: &str) -> Result<()> {
        self.term.write_line(&style(title).bold().to_string())?;
        self.term.write_line(description)?;
        self.term.write_line("")?;
        Ok(())
    }
}

impl Wizard for TerminalWizard {
    fn select_scenario(
        &mut self,
        scenarios: &IndexMap<PathBuf, Scenario>,
    ) -> Result<WizardChoice<PathBuf>> {
        self.header(
            "Select installation scenario",
            "Please select one of the pre-set installation scenarios. \
             You can customize your setup later during the installation.",
        )?;
        let mut labels: Vec<String> = scenarios
            .values()
            .map(|s| match s.description.as_deref() {
                Some(d) => format!("{}: {d}", s.name),
                None => s.name.clone(),
            })
            .collect();
        labels.push("Cancel Installation".to_string());

        let picked = Select::with_theme(&self.theme)
            .items(&labels)
            .default(0)
            .interact_on_opt(&self.term)?;
        Ok(match picked.and_then(|i| scenarios.get_index(i)) {
            Some((path, _)) => WizardChoice::Picked(path.clone()),
            None => WizardChoice::Cancel,
        })
    }

    fn confirm_scenario_change(&mut self, overview: &[String]) -> Result<WizardChoice<()>> {
        for line in overview {
            self.term.write_line(line)?;
        }
        self.term.write_line("")?;
        self.header(
            "Confirm installation scenario selection",
            "You are trying to replace existing installation with different scenario. \
             This may lead to unpredictable states. Please confirm that you want to proceed.",
        )?;
        let items = [
            "Proceed with selected installation scenario",
            "Cancel Installation",
        ];
        let picked = Select::with_theme(&self.theme)
            .items(&items)
            .default(1)
            .interact_on_opt(&self.term)?;
        Ok(match picked {
            Some(0) => WizardChoice::Picked(()),
            _ => WizardChoice::Cancel,
        })
    }
}

/// Replays fixed answers and records what it was asked.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ScriptedWizard {
    pub selection: Option<WizardChoice<PathBuf>>,
    pub confirmation: Option<WizardChoice<()>>,
    pub selections_asked: usize,
    pub confirmations_asked: Vec<Vec<String>>,
}

#[cfg(test)]
impl Wizard for ScriptedWizard {
    fn select_scenario(
        &mut self,
        _scenarios: &IndexMap<PathBuf, Scenario>,
    ) -> Result<WizardChoice<PathBuf>> {
        self.selections_asked += 1;
        Ok(self.selection.clone().unwrap_or(WizardChoice::Cancel))
    }

    fn confirm_scenario_change(&mut self, overview: &[String]) -> Result<WizardChoice<()>> {
        self.confirmations_asked.push(overview.to_vec());
        Ok(self.confirmation.clone().unwrap_or(WizardChoice::Cancel))
    }
}
