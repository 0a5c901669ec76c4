use std::collections::HashMap;

use futures::future::BoxFuture;
use rand::{Rng, distributions::WeightedIndex, prelude::Distribution as _};
use thiserror::Error;

use super::DynError;

pub type TaskFuture<'a> = BoxFuture<'a, Result<(), DynError>>;
pub type TaskFn<U> = for<'a> fn(&'a mut U) -> TaskFuture<'a>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskTableError {
    #[error("user kind '{kind}' defines no tasks")]
    Empty { kind: String },
    #[error("all task weights of user kind '{kind}' are zero")]
    ZeroWeight { kind: String },
}

pub struct Task<U> {
    name: &'static str,
    weight: u32,
    run: TaskFn<U>,
}

impl<U> Task<U> {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    pub fn run<'a>(&self, user: &'a mut U) -> TaskFuture<'a> {
        (self.run)(user)
    }
}

/// Named, weighted task callables of one user kind.
pub struct TaskTable<U> {
    tasks: Vec<Task<U>>,
}

impl<U> Default for TaskTable<U> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<U> TaskTable<U> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, weight: u32, run: TaskFn<U>) -> Self {
        self.tasks.push(Task { name, weight, run });
        self
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task<U>] {
        &self.tasks
    }

    #[must_use]
    pub fn weight_of(&self, name: &str) -> Option<u32> {
        self.tasks
            .iter()
            .find(|task| task.name == name)
            .map(|task| task.weight)
    }

    /// Replaces weights named `<kind>.<task>` in `overrides`.
    #[must_use]
    pub fn with_overrides(mut self, kind: &str, overrides: &HashMap<String, u32>) -> Self {
        for task in &mut self.tasks {
            if let Some(weight) = overrides.get(&format!("{kind}.{}", task.name)) {
                task.weight = *weight;
            }
        }
        self
    }

    pub fn dispatcher(self, kind: &str) -> Result<TaskDispatcher<U>, TaskTableError> {
        if self.tasks.is_empty() {
            return Err(TaskTableError::Empty {
                kind: kind.to_owned(),
            });
        }
        let index = WeightedIndex::new(self.tasks.iter().map(|task| task.weight)).map_err(|_| {
            TaskTableError::ZeroWeight {
                kind: kind.to_owned(),
            }
        })?;
        Ok(TaskDispatcher {
            tasks: self.tasks,
            index,
        })
    }
}

/// Weighted random choice over a validated [`TaskTable`].
pub struct TaskDispatcher<U> {
    tasks: Vec<Task<U>>,
    index: WeightedIndex<u32>,
}

impl<U> TaskDispatcher<U> {
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &Task<U> {
        &self.tasks[self.index.sample(rng)]
    }
}
