//! Registered tasks and lookups over them

use std::collections::BTreeSet;

use crate::task::Task;

/// Index of a task in its [`Registry`]; the identity used for run-once
pub type TaskIndex = usize;

/// Tasks in registration order.
///
/// Subtasks are flattened depth-first right after their parent. Tasks are
/// never changed once registered.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: Vec<Task>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut task: Task) {
        let subtasks = std::mem::take(&mut task.subtasks);
        self.tasks.push(task);
        for subtask in subtasks {
            self.register(subtask);
        }
    }

    pub fn register_all<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = Task>,
    {
        for task in tasks {
            self.register(task);
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: TaskIndex) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Every task called `name`, in registration order
    pub fn find_by_name(&self, name: &str) -> Vec<TaskIndex> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Every task subscribed to `name`, in registration order
    pub fn find_by_label(&self, name: &str) -> Vec<TaskIndex> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.runs_on.iter().any(|label| label == name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Task names plus every name some task subscribes to, sorted
    pub fn names(&self) -> BTreeSet<&str> {
        self.tasks
            .iter()
            .flat_map(|t| {
                std::iter::once(t.name.as_str()).chain(t.runs_on.iter().map(String::as_str))
            })
            .collect()
    }
}
