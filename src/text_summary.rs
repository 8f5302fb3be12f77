//! Text builders for CLI output.
//!
//! Scenario listings and scenario comparisons are formatted here as plain
//! lines so callers can route them to stdout, a prompt or a test.

use crate::config::diff::{ConfigurationDiff, ModuleStatusDelta};
use crate::config::{display_value, Configuration};
use crate::model::Scenario;
use dialoguer::console::style;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScenarioListing<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub path: &'a Path,
    pub installed: bool,
}

pub(crate) fn scenario_listing<'a>(
    scenarios: &'a IndexMap<PathBuf, Scenario>,
    previous: Option<&Path>,
) -> Vec<ScenarioListing<'a>> {
    scenarios
        .iter()
        .map(|(path, s)| ScenarioListing {
            name: &s.name,
            description: s.description.as_deref(),
            path,
            installed: previous == Some(path.as_path()),
        })
        .collect()
}

/// Human-readable list of available scenarios.
pub(crate) fn build_scenario_list(
    scenarios: &IndexMap<PathBuf, Scenario>,
    previous: Option<&Path>,
    config_dir: &Path,
) -> TextSummary {
    let mut lines = vec![style("Available scenarios").cyan().to_string()];
    for (path, scenario) in scenarios {
        let usage = if previous == Some(path.as_path()) {
            "INSTALLED".to_string()
        } else {
            format!("use: --scenario {}", scenario.stem())
        };
        lines.push(format!("  {} ({usage})", style(&scenario.name).bold()));
        if let Some(description) = scenario.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(format!("        {description}"));
        }
    }
    if scenarios.is_empty() {
        lines.push(format!(
            "  No available scenarios found in {}",
            config_dir.display()
        ));
    }
    TextSummary { lines }
}

fn module_status(status: Option<bool>) -> &'static str {
    match status {
        None => "N/A",
        Some(true) => "ENABLED",
        Some(false) => "DISABLED",
    }
}

fn module_line(name: &str, delta: &ModuleStatusDelta) -> String {
    let line = format!(
        "{name:<50}: {:<9} -> {}",
        module_status(delta.previous),
        module_status(delta.current)
    );
    if delta.is_disabling() {
        style(line).red().bold().to_string()
    } else {
        line
    }
}

/// Overview of what switching from `previous` to `current` does.
pub(crate) fn build_scenario_diff(
    previous: &Configuration,
    current: &Configuration,
    diff: &ConfigurationDiff,
) -> TextSummary {
    let title = |s: String| style(s).bold().to_string();
    let mut lines = vec![
        String::new(),
        title(format!(
            "Overview of modules used in the scenarios ({} -> {}):",
            previous.name(),
            current.name()
        )),
    ];
    lines.extend(diff.modules.iter().map(|(name, d)| module_line(name, d)));

    lines.push(String::new());
    lines.push(title(
        "Defaults that will be updated with values from previous installation:".into(),
    ));
    if diff.changed.is_empty() {
        lines.push("  No values will be updated from previous scenario".into());
    }
    for c in &diff.changed {
        lines.push(format!(
            "  {}: {} -> {}",
            c.param.identifier(),
            display_value(c.param.value.as_ref()),
            display_value(c.previous_value.as_ref())
        ));
    }

    lines.push(String::new());
    lines.push(title(
        "Values from previous installation that will be lost by scenario change:".into(),
    ));
    if diff.missing.is_empty() {
        lines.push("  No values from previous installation will be lost".into());
    }
    for p in &diff.missing {
        lines.push(format!(
            "  {}: {}",
            p.identifier(),
            display_value(p.value.as_ref())
        ));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::diff::diff;
    use crate::config::fixtures::write_scenario;
    use crate::scenario::ScenarioStore;
    use dialoguer::console::strip_ansi_codes;

    fn plain(summary: TextSummary) -> Vec<String> {
        summary
            .lines
            .iter()
            .map(|l| strip_ansi_codes(l).into_owned())
            .collect()
    }

    fn has(lines: &[String], expected: &str) -> bool {
        lines.iter().any(|l| l == expected)
    }

    #[test]
    fn diff_overview_lists_modules_changes_and_losses() {
        let dir = tempfile::tempdir().unwrap();
        let prev = Configuration::load(&write_scenario(
            dir.path(),
            "prev",
            "",
            "web:\n  port: 9000\n  tls: true\ndb: true\n",
        ))
        .unwrap();
        let next = Configuration::load(&write_scenario(
            dir.path(),
            "next",
            "",
            "web:\n  port: 80\ndb: false\n",
        ))
        .unwrap();
        let d = diff(&prev, &next);
        let summary = build_scenario_diff(&prev, &next, &d);
        let db_line = summary
            .lines
            .iter()
            .find(|l| strip_ansi_codes(l).starts_with("db "))
            .cloned()
            .unwrap();
        let lines = plain(summary);

        let header = "Overview of modules used in the scenarios (prev -> next):";
        let web = format!("{:<50}: {:<9} -> {}", "web", "ENABLED", "ENABLED");
        let db = format!("{:<50}: {:<9} -> {}", "db", "ENABLED", "DISABLED");
        assert!(has(&lines, header));
        assert!(has(&lines, &web));
        assert!(has(&lines, &db));
        assert!(has(&lines, "  web::port: 80 -> 9000"));
        assert!(has(&lines, "  web::tls: true"));
        // the disabling line carries styling when colors are on; never its text
        assert!(strip_ansi_codes(&db_line).contains("DISABLED"));
    }

    #[test]
    fn identical_scenarios_report_nothing_to_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scenario(dir.path(), "same", "", "web: true\n");
        let conf = Configuration::load(&path).unwrap();
        let lines = plain(build_scenario_diff(&conf, &conf, &diff(&conf, &conf)));
        let nothing_updated = "  No values will be updated from previous scenario";
        let nothing_lost = "  No values from previous installation will be lost";
        assert!(has(&lines, nothing_updated));
        assert!(has(&lines, nothing_lost));
    }

    #[test]
    fn listing_marks_the_installed_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_scenario(dir.path(), "a", "description: First one\n", "x: true\n");
        write_scenario(dir.path(), "b", "", "x: true\n");
        let store = ScenarioStore::new(dir.path());
        store.link_last_scenario(&a).unwrap();
        let store = ScenarioStore::new(dir.path());

        let scenarios = store.list_scenarios();
        let lines = plain(build_scenario_list(
            &scenarios,
            store.previous_scenario_path(),
            store.config_dir(),
        ));
        assert_eq!(
            lines,
            vec![
                "Available scenarios".to_string(),
                "  a (INSTALLED)".to_string(),
                "        First one".to_string(),
                "  b (use: --scenario b)".to_string(),
            ]
        );
    }

    #[test]
    fn empty_directory_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let lines = plain(build_scenario_list(&IndexMap::new(), None, dir.path()));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  No available scenarios found in"));
    }
}
