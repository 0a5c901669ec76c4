use std::{path::PathBuf, process, time::Duration};

use anyhow::{Context as _, Result};
use clap::Parser;
use loadgen_runner::{LoadConfig, defaults, run_load};
use tracing::{info, warn};

/// Drives synthetic contract load against a NEAR-compatible RPC node.
#[derive(Debug, Parser)]
#[command(name = "loadgen")]
struct Cli {
    /// YAML load description. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    rpc_url: Option<String>,
    /// Key file of the account that funds contracts and users.
    #[arg(long)]
    funding_key: Option<PathBuf>,
    #[arg(long)]
    users: Option<usize>,
    #[arg(long)]
    run_secs: Option<u64>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    ft_wasm: Option<PathBuf>,
    #[arg(long)]
    social_wasm: Option<PathBuf>,
    #[arg(long)]
    sweat_wasm: Option<PathBuf>,
    #[arg(long)]
    depend_wasm: Option<PathBuf>,
}

impl Cli {
    fn load_config(self) -> Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => LoadConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LoadConfig::default(),
        };
        config.apply_env();

        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = rpc_url;
        }
        if let Some(funding_key) = self.funding_key {
            config.funding_key = Some(funding_key);
        }
        if let Some(users) = self.users {
            config.users = users;
        }
        if let Some(run_secs) = self.run_secs {
            config.run_duration = Duration::from_secs(run_secs);
        }
        if let Some(run_id) = self.run_id {
            config.run_id = run_id;
        }
        if let Some(path) = self.ft_wasm {
            config.contracts.ft = path;
        }
        if let Some(path) = self.social_wasm {
            config.contracts.social = path;
        }
        if let Some(path) = self.sweat_wasm {
            config.contracts.sweat = path;
        }
        if let Some(path) = self.depend_wasm {
            config.contracts.depend = path;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    defaults::init_tracing();

    let cli = Cli::parse();
    tokio::select! {
        result = run(cli) => {
            if let Err(err) = result {
                warn!("load test failed: {err:#}");
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning load test");
            process::exit(130);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    info!(
        users = config.users,
        duration_secs = config.run_duration.as_secs(),
        workloads = ?config.workloads,
        "starting load test"
    );

    let summary = run_load(&config).await.context("load test aborted")?;
    info!(
        spawned = summary.spawned,
        registered = summary.registered,
        abandoned = summary.abandoned,
        tasks_succeeded = summary.tasks_succeeded,
        tasks_failed = summary.tasks_failed,
        elapsed_secs = summary.elapsed.as_secs(),
        "load test complete"
    );
    Ok(())
}
