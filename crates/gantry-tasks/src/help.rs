//! Task listing shown by the `help` task

use std::collections::BTreeSet;
use std::fmt::Write as _;

use console::style;

use crate::registry::Registry;

/// One line of help output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    pub name: String,
    pub description: String,
    /// Task names that run when this one is invoked
    pub runs: BTreeSet<String>,
}

impl Registry {
    /// Help entries for every described task name, sorted by name.
    ///
    /// Descriptions of tasks sharing a name are joined with `"; "`. A name
    /// with no description of its own borrows the first described
    /// subscriber's.
    pub fn help(&self) -> Vec<HelpEntry> {
        let mut entries = Vec::new();

        for name in self.names() {
            let mut descriptions: Vec<&str> = Vec::new();
            let mut runs = BTreeSet::new();

            for index in self.find_by_name(name) {
                let Some(task) = self.get(index) else {
                    continue;
                };
                if !task.description.is_empty() {
                    descriptions.push(&task.description);
                }
                runs.extend(task.dependencies.iter().cloned());
            }

            let mut description = descriptions.join("; ");
            for index in self.find_by_label(name) {
                let Some(task) = self.get(index) else {
                    continue;
                };
                runs.insert(task.name.clone());
                if description.is_empty() {
                    description = task.description.clone();
                }
            }

            if description.is_empty() {
                continue;
            }
            entries.push(HelpEntry {
                name: name.to_string(),
                description,
                runs,
            });
        }

        entries
    }
}

/// Render entries as an aligned list under a `Tasks:` heading
pub fn render_help(entries: &[HelpEntry]) -> String {
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut out = String::from("Tasks:\n");

    for entry in entries {
        let pad = width - entry.name.len();
        let _ = write!(
            out,
            "  * {}{:pad$} - {}",
            style(&entry.name).green(),
            "",
            entry.description,
        );
        if !entry.runs.is_empty() {
            let runs = entry.runs.iter().cloned().collect::<Vec<_>>().join(", ");
            let _ = write!(out, " (runs: {})", style(runs).dim());
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_all([
            Task::new("build").with_description("compile"),
            Task::new("test")
                .with_description("unit tests")
                .depends_on("build"),
            Task::new("test").with_description("doc tests"),
            Task::new("lint:fmt")
                .with_description("check formatting")
                .runs_on("lint")
                .runs_on("static-analysis"),
            Task::new("lint:clippy").runs_on("lint"),
            Task::new("internal"),
        ]);
        registry
    }

    fn find<'a>(entries: &'a [HelpEntry], name: &str) -> Option<&'a HelpEntry> {
        entries.iter().find(|e| e.name == name)
    }

    #[test]
    fn test_descriptions_join_and_sort() {
        let entries = registry().help();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(
            names,
            vec!["build", "lint", "lint:fmt", "static-analysis", "test"]
        );
        let test = find(&entries, "test").unwrap();
        assert_eq!(test.description, "unit tests; doc tests");
        assert_eq!(test.runs.iter().collect::<Vec<_>>(), vec!["build"]);
    }

    #[test]
    fn test_subscription_only_names_listed() {
        let entries = registry().help();

        let lint = find(&entries, "lint").unwrap();
        assert_eq!(lint.description, "check formatting");
        assert_eq!(
            lint.runs.iter().collect::<Vec<_>>(),
            vec!["lint:clippy", "lint:fmt"]
        );
        assert!(find(&entries, "static-analysis").is_some());
    }

    #[test]
    fn test_undescribed_subscriber_does_not_hide_description() {
        let mut registry = Registry::new();
        registry.register_all([
            Task::new("A").runs_on("clean"),
            Task::new("clean-things")
                .with_description("x")
                .runs_on("clean"),
        ]);

        let entries = registry.help();
        let clean = find(&entries, "clean").unwrap();
        assert_eq!(clean.description, "x");
        assert_eq!(
            clean.runs.iter().collect::<Vec<_>>(),
            vec!["A", "clean-things"]
        );
    }

    #[test]
    fn test_undescribed_names_skipped() {
        let entries = registry().help();
        assert!(find(&entries, "internal").is_none());
        assert!(find(&entries, "lint:clippy").is_none());
    }

    #[test]
    fn test_render_help_alignment() {
        let entries = registry().help();
        let rendered = console::strip_ansi_codes(&render_help(&entries)).into_owned();
        let lines: Vec<_> = rendered.lines().collect();

        assert_eq!(lines[0], "Tasks:");
        assert_eq!(lines[1], "  * build           - compile");
        assert_eq!(
            lines[5],
            "  * test            - unit tests; doc tests (runs: build)"
        );
    }
}
