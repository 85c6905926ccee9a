//! Tasks every build program gets

use std::ffi::OsString;
use std::path::Path;

use anyhow::Context as _;
use gantry_core::Result;
use gantry_tasks::{render_help, Task, TaskContext};
use tracing::debug;

/// Built-in tasks, registered after the program's own.
///
/// `build_dir` locates the build program for the `makefile` task.
pub(crate) fn default_tasks(build_dir: String) -> Vec<Task> {
    vec![
        Task::new("help")
            .with_description("print this help message")
            .with_action(|ctx| {
                print!("{}", render_help(&ctx.registry().help()));
                Ok(())
            }),
        Task::new("clean").with_description("clean all generated files"),
        Task::new("dependencies:update").with_description("update all dependencies"),
        Task::new("debuginfo").with_action(debuginfo),
        Task::new("test").with_description("run all tests"),
        Task::new("makefile").with_action(move |ctx| {
            print!("{}", ctx.registry().makefile(&build_dir));
            Ok(())
        }),
    ]
}

fn debuginfo(_ctx: &TaskContext<'_>) -> Result<()> {
    let mut vars: Vec<(String, String)> = std::env::vars_os()
        .map(|(k, v)| (lossy(k), lossy(v)))
        .collect();
    vars.sort();
    for (name, value) in &vars {
        debug!(name = %name, value = %value, "environment");
    }

    if let Some(path) = std::env::var_os("GITHUB_EVENT_PATH").filter(|p| !p.is_empty()) {
        let path = Path::new(&path);
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading GitHub event file {}", path.display()))?;
        debug!("GitHub Action event:\n{}", format_json(&raw));
    }
    Ok(())
}

fn lossy(s: OsString) -> String {
    s.into_string()
        .unwrap_or_else(|s| s.to_string_lossy().into_owned())
}

/// Pretty-print JSON, or return the input unchanged if it does not parse
fn format_json(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_tasks::Registry;

    #[test]
    fn test_default_task_names() {
        let names: Vec<String> = default_tasks(String::new())
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "help",
                "clean",
                "dependencies:update",
                "debuginfo",
                "test",
                "makefile",
            ]
        );
    }

    #[test]
    fn test_aggregators_listed_in_help() {
        let mut registry = Registry::new();
        registry.register(Task::new("unit").runs_on("test"));
        registry.register_all(default_tasks(String::new()));

        let help = registry.help();
        let test = help.iter().find(|e| e.name == "test").unwrap();
        assert_eq!(test.description, "run all tests");
        assert!(test.runs.contains("unit"));
        assert!(!help.iter().any(|e| e.name == "debuginfo"));
    }

    #[test]
    fn test_format_json() {
        assert_eq!(format_json(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(format_json("not json"), "not json");
    }
}
