//! GNU Makefile shim forwarding `make <task>` to the build program

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::registry::Registry;

impl Registry {
    /// Render a Makefile with one phony target per task name.
    ///
    /// `build_dir` is the directory holding the build program's
    /// `Cargo.toml`, relative to where the Makefile will live.
    pub fn makefile(&self, build_dir: &str) -> String {
        let manifest = manifest_path(build_dir);
        let mut out = String::new();
        let mut seen = BTreeSet::new();

        for task in self.tasks() {
            if !seen.insert(task.name.as_str()) {
                continue;
            }
            let _ = writeln!(out, ".PHONY: {}", task.name);
            let _ = writeln!(out, "{}:", task.name);
            let _ = writeln!(
                out,
                "\t@cargo run --quiet --manifest-path {manifest} -- {}",
                task.name
            );
        }

        out.push_str(".PHONY: *\n");
        out.push_str(".DEFAULT:\n");
        let _ = writeln!(out, "\t@cargo run --quiet --manifest-path {manifest} -- $@");
        out
    }
}

fn manifest_path(build_dir: &str) -> String {
    let dir = build_dir.trim_matches(|c| c == '/' || c == '\\');
    if dir.is_empty() {
        "Cargo.toml".to_string()
    } else {
        format!("{dir}/Cargo.toml")
    }
}
