//! Build tasks for the Gantry workspace itself

use gantry::{Command, Makefile, Output, Task};

fn main() {
    Makefile::new([
        Task::new("format")
            .with_description("format all source files")
            .with_action(|ctx| ctx.run_line("cargo fmt --all").map(drop)),
        Task::new("lint")
            .with_description("check formatting and run clippy")
            .with_action(|ctx| {
                ctx.run_line("cargo fmt --all -- --check")?;
                ctx.run(
                    Command::new("cargo")
                        .args(["clippy", "--workspace", "--all-targets", "--"])
                        .args(["-D", "warnings"])
                        .stderr(Output::Terminal),
                )?;
                Ok(())
            }),
        Task::new("unit")
            .with_description("run unit tests")
            .runs_on("test")
            .with_action(|ctx| {
                ctx.run(
                    Command::new("cargo")
                        .args(["test", "--workspace"])
                        .stdout(Output::Terminal),
                )
                .map(drop)
            }),
        Task::new("clean:target")
            .runs_on("clean")
            .with_action(|ctx| ctx.run_line("cargo clean").map(drop)),
        Task::new("dependencies:cargo")
            .runs_on("dependencies:update")
            .with_action(|ctx| ctx.run_line("cargo update").map(drop)),
        Task::new("ci")
            .with_description("run every check CI runs")
            .depends_on("lint")
            .depends_on("test"),
    ])
    .run()
}
