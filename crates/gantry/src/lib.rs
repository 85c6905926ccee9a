//! Gantry - build tasks written in Rust
//!
//! A build program lists its tasks and hands them to [`Makefile`]:
//!
//! ```no_run
//! use gantry::{Command, Makefile, Task};
//!
//! fn main() {
//!     Makefile::new([
//!         Task::new("build")
//!             .with_description("compile the workspace")
//!             .with_action(|ctx| ctx.run(Command::new("cargo").arg("build")).map(drop)),
//!         Task::new("unit")
//!             .runs_on("test")
//!             .with_action(|ctx| ctx.run_line("cargo test --workspace").map(drop)),
//!     ])
//!     .run()
//! }
//! ```
//!
//! Running `cargo run -- build` then runs `build` and everything it depends
//! on, each task at most once.

pub mod cli;
mod defaults;
mod exit_codes;
pub mod logging;
mod progress;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;
use gantry_core::handle_errors;
use gantry_tasks::{Executor, Registry};
use tracing::debug;

use cli::Cli;

pub use gantry_core::{catch, Config, GantryError, Result, ResultExt, TracedError};
pub use gantry_exec::{
    CancellationToken, Command, CommandResolver, Input, Output, Renderer, Session, SharedBuffer,
    Sink, Tee, Tokenizer,
};
pub use gantry_tasks::{Task, TaskContext};

type SessionSetup = Box<dyn FnOnce(Session) -> Session>;

/// Entry point for a build program
pub struct Makefile {
    tasks: Vec<Task>,
    setup: Option<SessionSetup>,
}

impl Makefile {
    pub fn new<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = Task>,
    {
        Self {
            tasks: tasks.into_iter().collect(),
            setup: None,
        }
    }

    /// Adjust the session before any task runs, e.g. to install a renderer
    pub fn configure_session<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(Session) -> Session + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Run with the process arguments and exit
    pub fn run(self) -> ! {
        let code = self.run_from(std::env::args_os());
        std::process::exit(code)
    }

    /// Run with the given arguments, returning the process exit code
    pub fn run_from<I, T>(self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                return if e.use_stderr() {
                    exit_codes::USAGE_ERROR
                } else {
                    exit_codes::SUCCESS
                };
            }
        };

        let loaded = cli
            .start_dir()
            .and_then(|dir| cli.load_config(&dir).map(|config| (dir, config)));
        let (start_dir, config) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => return handle_errors(Err(e), cli.debug || cli.trace),
        };

        let _guard = logging::init_tracing(&config);
        let debug = config.debug();
        let result = catch(|| self.execute(config, &start_dir, &cli.task_names()));
        handle_errors(result, debug)
    }

    fn execute(self, config: Config, start_dir: &Path, names: &[String]) -> Result<()> {
        let root = config
            .root_dir
            .clone()
            .unwrap_or_else(|| start_dir.to_path_buf());
        std::env::set_current_dir(&root)?;
        debug!(root = %root.display(), "changed to root directory");

        let mut session = Session::new(config)?;
        if let Some(setup) = self.setup {
            session = setup(session);
        }
        session.cancel_on_interrupt();

        let mut registry = Registry::new();
        registry.register_all(self.tasks);
        registry.register_all(defaults::default_tasks(build_dir(&root, start_dir)));

        let run = || catch(|| Executor::new(&registry, &session).run(names));
        let result = if session.debug() {
            progress::with_progress_reports(&session, progress::REPORT_INTERVAL, run)
        } else {
            run()
        };
        session.exit_hooks().run();
        result
    }
}

impl std::fmt::Debug for Makefile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Makefile")
            .field("tasks", &self.tasks)
            .field("setup", &self.setup.is_some())
            .finish()
    }
}

/// Directory of the build program relative to the root, for the Makefile shim
fn build_dir(root: &Path, start_dir: &Path) -> String {
    let program_dir = std::env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| start_dir.to_path_buf());
    match program_dir.strip_prefix(root) {
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => program_dir.to_string_lossy().into_owned(),
    }
}
