//! Resolving task names and running them in dependency order

use std::collections::HashSet;
use std::time::Instant;

use gantry_core::{GantryError, Result};
use gantry_exec::Session;
use tracing::{debug, info_span, instrument};

use crate::registry::{Registry, TaskIndex};
use crate::reporter::{TaskEvent, TaskReporterRegistry};
use crate::task::TaskContext;

/// Tasks already run during one invocation
#[derive(Debug, Default)]
pub struct ExecutionState {
    visited: HashSet<TaskIndex>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self, index: TaskIndex) -> bool {
        self.visited.contains(&index)
    }

    /// Record `index`; returns false if it was already recorded
    fn mark(&mut self, index: TaskIndex) -> bool {
        self.visited.insert(index)
    }
}

/// Runs tasks from a registry against a session.
///
/// The walk is sequential: subscribers of a task run first, then its
/// dependencies, then its own action. Each registered task runs at most once
/// per [`Executor::run`] call.
pub struct Executor<'a> {
    registry: &'a Registry,
    session: &'a Session,
    reporters: TaskReporterRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a Registry, session: &'a Session) -> Self {
        Self {
            registry,
            session,
            reporters: TaskReporterRegistry::new(),
        }
    }

    pub fn with_reporters(mut self, reporters: TaskReporterRegistry) -> Self {
        self.reporters = reporters;
        self
    }

    /// Run each named task in order; with no names, run the first task
    #[instrument(skip(self), fields(tasks = self.registry.len()))]
    pub fn run(&self, names: &[String]) -> Result<()> {
        let Some(first) = self.registry.tasks().first() else {
            return Err(GantryError::NoTasks.into());
        };

        let mut state = ExecutionState::new();
        if names.is_empty() {
            debug!(task = %first.name, "no task requested, running the first one");
            return self.run_task(&mut state, &first.name);
        }

        for name in names {
            self.run_task(&mut state, name)?;
        }
        Ok(())
    }

    /// Run every task called `name` that has not yet run in `state`
    pub fn run_task(&self, state: &mut ExecutionState, name: &str) -> Result<()> {
        let matches = self.registry.find_by_name(name);
        if matches.is_empty() {
            return Err(GantryError::UnknownTask(name.to_string()).into());
        }

        for index in matches {
            if !state.mark(index) {
                self.reporters.broadcast(&TaskEvent::Skipped {
                    task: name.to_string(),
                    reason: "already ran".to_string(),
                });
                continue;
            }
            let Some(task) = self.registry.get(index) else {
                continue;
            };

            for subscriber in self.registry.find_by_label(&task.name) {
                if let Some(s) = self.registry.get(subscriber) {
                    self.run_task(state, &s.name)?;
                }
            }
            for dependency in &task.dependencies {
                self.run_task(state, dependency)?;
            }

            if let Some(action) = &task.action {
                let span = info_span!("task", name = %task.name);
                let _entered = span.enter();
                let _label = self.session.enter_task(&task.name);

                self.reporters.broadcast(&TaskEvent::Started {
                    task: task.name.clone(),
                });
                let started = Instant::now();
                let ctx = TaskContext {
                    name: &task.name,
                    session: self.session,
                    registry: self.registry,
                };

                match action(&ctx) {
                    Ok(()) => self.reporters.broadcast(&TaskEvent::Completed {
                        task: task.name.clone(),
                        duration: started.elapsed(),
                    }),
                    Err(err) => {
                        if !err.is_stop() {
                            self.reporters.broadcast(&TaskEvent::Failed {
                                task: task.name.clone(),
                                duration: started.elapsed(),
                                error: err.to_string(),
                            });
                        }
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use crate::task::Task;
    use gantry_core::{Config, TracedError};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(name: &str, log: &Log) -> Task {
        let log = log.clone();
        let tag = name.to_string();
        Task::new(name).with_action(move |_| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        })
    }

    fn session() -> Session {
        Session::new(Config::default()).unwrap()
    }

    fn run(registry: &Registry, names: &[&str]) -> Result<()> {
        let session = session();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Executor::new(registry, &session)
            .with_reporters(TaskReporterRegistry::empty())
            .run(&names)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_dependencies_run_first_in_order() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("build", &log).depends_on("gen").depends_on("fmt"),
            recording("gen", &log),
            recording("fmt", &log),
        ]);

        run(&registry, &["build"]).unwrap();

        assert_eq!(entries(&log), vec!["gen", "fmt", "build"]);
    }

    #[test]
    fn test_diamond_runs_shared_dependency_once() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("a", &log).depends_on("b").depends_on("c"),
            recording("b", &log).depends_on("d"),
            recording("c", &log).depends_on("d"),
            recording("d", &log),
        ]);

        run(&registry, &["a"]).unwrap();

        assert_eq!(entries(&log), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_subscribers_run_before_dependencies() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("release", &log).depends_on("build"),
            recording("build", &log),
            recording("changelog", &log).runs_on("release"),
        ]);

        run(&registry, &["release"]).unwrap();

        assert_eq!(entries(&log), vec!["changelog", "build", "release"]);
    }

    #[test]
    fn test_subscribers_run_in_order_before_dependencies() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("P", &log).runs_on("clean"),
            recording("clean", &log).depends_on("clean-helper"),
            recording("Q", &log).runs_on("clean"),
            recording("clean-helper", &log),
        ]);

        run(&registry, &["clean"]).unwrap();

        assert_eq!(entries(&log), vec!["P", "Q", "clean-helper", "clean"]);
    }

    #[test]
    fn test_cyclic_subscriptions_terminate() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("x", &log).runs_on("y"),
            recording("y", &log).runs_on("x"),
        ]);

        run(&registry, &["x"]).unwrap();

        assert_eq!(entries(&log), vec!["y", "x"]);
    }

    #[test]
    fn test_cyclic_dependencies_terminate() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("x", &log).depends_on("y"),
            recording("y", &log).depends_on("x"),
        ]);

        run(&registry, &["x"]).unwrap();

        assert_eq!(entries(&log), vec!["y", "x"]);
    }

    #[test]
    fn test_shared_names_each_run_once() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            recording("test", &log),
            recording("lint", &log),
            recording("test", &log).depends_on("lint"),
        ]);

        run(&registry, &["test", "test", "lint"]).unwrap();

        assert_eq!(entries(&log), vec!["test", "lint", "test"]);
    }

    #[test]
    fn test_empty_names_run_first_task() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([recording("default", &log), recording("other", &log)]);

        run(&registry, &[]).unwrap();

        assert_eq!(entries(&log), vec!["default"]);
    }

    #[test]
    fn test_empty_registry_is_an_error() {
        let err = run(&Registry::new(), &["anything"]).unwrap_err();
        assert!(matches!(err.error(), GantryError::NoTasks));
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        let mut registry = Registry::new();
        registry.register(Task::new("build"));

        let err = run(&registry, &["deploy"]).unwrap_err();

        assert!(matches!(err.error(), GantryError::UnknownTask(name) if name == "deploy"));
        assert_eq!(
            err.to_string().lines().next(),
            Some("no tasks named: deploy")
        );
    }

    #[test]
    fn test_failure_stops_the_walk() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register_all([
            Task::new("broken").with_action(|_| Err(GantryError::other("boom").into())),
            recording("after", &log),
        ]);

        let err = run(&registry, &["broken", "after"]).unwrap_err();

        assert!(err.to_string().contains("boom"));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_action_sees_task_label_and_registry() {
        let seen = Arc::new(Mutex::new(None));
        let mut registry = Registry::new();
        let slot = seen.clone();
        registry.register(Task::new("inspect").with_action(move |ctx| {
            *slot.lock().unwrap() = Some((
                ctx.name().to_string(),
                ctx.session().current_task(),
                ctx.registry().len(),
            ));
            Ok(())
        }));

        let session = session();
        Executor::new(&registry, &session)
            .run(&["inspect".to_string()])
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(("inspect".to_string(), Some("inspect".to_string()), 1))
        );
        assert_eq!(session.current_task(), None);
    }

    #[test]
    fn test_reports_events() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut reporters = TaskReporterRegistry::empty();
        reporters.register_shared(collecting.clone());

        let mut registry = Registry::new();
        registry.register_all([
            Task::new("a")
                .depends_on("b")
                .depends_on("b")
                .with_action(|_| Ok(())),
            Task::new("b").with_action(|_| Ok(())),
            Task::new("c").with_action(|_| Err(TracedError::stop())),
        ]);

        let session = session();
        let executor = Executor::new(&registry, &session).with_reporters(reporters);
        executor.run(&["a".to_string()]).unwrap();
        let stop = executor.run(&["c".to_string()]).unwrap_err();

        assert!(stop.is_stop());
        assert_eq!(collecting.started(), vec!["b", "a", "c"]);
        let events = collecting.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, TaskEvent::Skipped { task, .. } if task == "b")));
        assert!(!events.iter().any(|e| matches!(e, TaskEvent::Failed { .. })));
    }
}
