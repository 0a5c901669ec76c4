mod runner;

pub use runner::{RunError, RunSummary, Runner, RunnerConfig};
