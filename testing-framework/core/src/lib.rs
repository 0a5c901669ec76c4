pub mod accounts;
pub mod gate;
pub mod proxy;
pub mod registry;
pub mod rpc;
pub mod scenario;
pub mod submission;
pub mod transaction;

use std::{ops::Mul as _, sync::LazyLock, time::Duration};

pub use accounts::{Account, AccountId, InMemorySigner, Nonce, SharedAccount};
pub use gate::ReadinessGate;
pub use proxy::{NodeProxy, ProxyError};
pub use registry::WorkloadRegistry;
pub use submission::{RetryPolicy, SubmissionError, Submitter};

static IS_SLOW_TEST_ENV: LazyLock<bool> = LazyLock::new(loadgen_env::slow_test_env);

/// In slow test environments like Codecov, use 2x timeout.
#[must_use]
pub fn adjust_timeout(d: Duration) -> Duration {
    if *IS_SLOW_TEST_ENV { d.mul(2) } else { d }
}
