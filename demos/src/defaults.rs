use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "info";

/// Directives from `RUST_LOG`, else `LOADGEN_LOG_FILTER`, else `info`.
#[must_use]
pub fn log_filter() -> EnvFilter {
    loadgen_env::rust_log()
        .or_else(loadgen_env::loadgen_log_filter)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

pub fn init_tracing() {
    let _ = fmt().with_env_filter(log_filter()).with_target(true).try_init();
}
