use std::sync::Arc;

use async_trait::async_trait;

use super::{DynError, TaskTable};

pub type UserId = u64;

/// Lifecycle of one simulated account holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserState {
    /// Spawned, waiting for the readiness gate.
    Created,
    /// Running its one-time registration.
    Registering,
    /// Executing weighted tasks.
    Active,
    Stopped,
}

/// A simulated user: registers once, then runs tasks from its table.
#[async_trait]
pub trait VirtualUser: Sized + Send + 'static {
    /// Shared state published by bootstrap.
    type Context: Send + Sync + 'static;

    /// Name used for logs and task weight overrides (`<kind>.<task>`).
    fn kind() -> &'static str;

    /// Registration. Only called after the readiness gate opened; an error
    /// abandons this user without affecting the others.
    async fn on_start(id: UserId, ctx: Arc<Self::Context>) -> Result<Self, DynError>;

    fn tasks() -> TaskTable<Self>;
}
