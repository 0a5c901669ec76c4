use std::{env, path::PathBuf};

#[must_use]
pub fn slow_test_env() -> bool {
    env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true")
}

#[must_use]
pub fn rust_log() -> Option<String> {
    env::var("RUST_LOG").ok()
}

#[must_use]
pub fn loadgen_log_filter() -> Option<String> {
    env::var("LOADGEN_LOG_FILTER").ok()
}

/// RPC endpoint override, e.g. `http://127.0.0.1:3030`.
#[must_use]
pub fn loadgen_rpc_url() -> Option<String> {
    env::var("LOADGEN_RPC_URL").ok()
}

#[must_use]
pub fn loadgen_funding_key() -> Option<PathBuf> {
    env::var("LOADGEN_FUNDING_KEY").ok().map(PathBuf::from)
}

#[must_use]
pub fn loadgen_run_id() -> Option<String> {
    env::var("LOADGEN_RUN_ID").ok()
}

#[must_use]
pub fn loadgen_users() -> Option<usize> {
    env::var("LOADGEN_USERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}
