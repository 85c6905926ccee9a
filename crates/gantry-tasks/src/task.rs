//! Task types and definitions

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use gantry_core::Result;
use gantry_exec::{Command, Session};
use tracing::{debug, warn};

use crate::registry::Registry;

/// Operation run when a task executes
pub type Action = Arc<dyn Fn(&TaskContext<'_>) -> Result<()> + Send + Sync>;

/// A named unit of work in the build
#[derive(Clone)]
pub struct Task {
    /// Task name (e.g., "build", "test", "lint"); need not be unique
    pub name: String,

    /// Shown in help output
    pub description: String,

    /// Task names run, in order, before this task's action
    pub dependencies: Vec<String>,

    /// Task names that trigger this task as if it were one of their dependencies
    pub runs_on: Vec<String>,

    /// Tasks registered right after this one
    pub subtasks: Vec<Task>,

    /// Absent for tasks that only aggregate others
    pub action: Option<Action>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            runs_on: Vec::new(),
            subtasks: Vec::new(),
            action: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a dependency
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Subscribe to another task name
    pub fn runs_on(mut self, name: impl Into<String>) -> Self {
        self.runs_on.push(name.into());
        self
    }

    pub fn with_subtask(mut self, task: Task) -> Self {
        self.subtasks.push(task);
        self
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("dependencies", &self.dependencies)
            .field("runs_on", &self.runs_on)
            .field("subtasks", &self.subtasks)
            .field("action", &self.action.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// What a running action can reach
pub struct TaskContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) session: &'a Session,
    pub(crate) registry: &'a Registry,
}

impl<'a> TaskContext<'a> {
    /// Name of the task being run
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn debug(&self) -> bool {
        self.session.debug()
    }

    /// Run an external command, returning its trimmed stdout
    pub fn run(&self, cmd: Command) -> Result<String> {
        self.session.run(cmd)
    }

    /// Run a command given as a single line
    pub fn run_line(&self, line: &str) -> Result<String> {
        self.session.run_line(line)
    }

    /// Call `f` with a fresh temporary directory.
    ///
    /// The directory is removed afterwards unless cleanup is disabled in the
    /// configuration, in which case it is kept for inspection.
    pub fn with_temp_dir<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let dir = tempfile::Builder::new().prefix("gantry-tmp-").tempdir()?;
        let result = f(dir.path());

        if self.session.config().cleanup {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove temporary directory");
            }
        } else {
            let kept = dir.keep();
            debug!(path = %kept.display(), "keeping temporary directory");
        }
        result
    }
}
