pub mod config;
pub mod defaults;

use std::sync::Arc;

pub use config::{ConfigError, LoadConfig};
use loadgen_core::{
    Account, NodeProxy,
    accounts::KeyError,
    rpc::{JsonRpcClient, RpcError},
    scenario::{RunError, RunSummary, Runner, TaskTableError},
};
use loadgen_workflows::{Bootstrap, SharedContext};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load funding key: {0}")]
    FundingKey(#[from] KeyError),
    #[error("failed to set up rpc client: {0}")]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    TaskTable(#[from] TaskTableError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Connects to the configured node and runs the whole load test.
pub async fn run_load(config: &LoadConfig) -> Result<RunSummary, LoadError> {
    config.validate()?;
    let funding = Account::from_key_file(config.funding_key()?)?;
    let rpc = JsonRpcClient::new(config.rpc_url()?, config.rpc_timeout)?;
    info!(rpc = %rpc.url(), funding = %funding.id(), "connecting to node");
    let node = NodeProxy::new(Arc::new(rpc), config.retry_policy());
    run_with_node(config, node, funding).await
}

/// Spawns the configured users, then bootstraps through `node` and releases
/// them once every contract is in place.
pub async fn run_with_node(
    config: &LoadConfig,
    node: NodeProxy,
    funding: Account,
) -> Result<RunSummary, LoadError> {
    let mut runner = Runner::<SharedContext>::new(config.runner_config());
    for (kind, count) in config.user_counts() {
        kind.spawn(&mut runner, count, &config.task_weights)?;
    }

    let bootstrap = Bootstrap::new(node, funding, config.bootstrap_config());
    Ok(runner.run(bootstrap.run()).await?)
}
