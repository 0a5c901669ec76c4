mod pacing;
pub mod runtime;
mod tasks;
mod user;

pub use pacing::WaitBetween;
pub use runtime::{RunError, RunSummary, Runner, RunnerConfig};
pub use tasks::{Task, TaskDispatcher, TaskFn, TaskFuture, TaskTable, TaskTableError};
pub use user::{UserId, UserState, VirtualUser};

/// Boxed error type used at user and task boundaries.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;
