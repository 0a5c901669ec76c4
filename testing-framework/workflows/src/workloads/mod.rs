pub mod depend;
pub mod ft;
pub mod social;
pub mod sweat;
pub mod user;

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use loadgen_core::{
    SharedAccount,
    proxy::NodeProxy,
    rpc::Receipt,
    scenario::{Runner, TaskTableError},
    submission::SubmissionError,
    transaction::{DeployContract, FunctionCall},
};
use serde::{Deserialize, Serialize};

use crate::context::SharedContext;

/// Deploys `code` to the contract account together with its `init` calls,
/// signed by that account. Either all of it lands or none of it does.
pub(crate) async fn deploy_code(
    node: &NodeProxy,
    account: &SharedAccount,
    code: Arc<[u8]>,
    init: &[FunctionCall],
) -> Result<Receipt, SubmissionError> {
    let tx = DeployContract {
        account_id: account.id().clone(),
        code,
        init: init
            .iter()
            .flat_map(|call| call.calls().iter().cloned())
            .collect(),
    };
    node.send_tx_shared(&tx, account).await
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Ft,
    Social,
    Sweat,
    Depend,
}

impl WorkloadKind {
    pub const ALL: [Self; 4] = [Self::Ft, Self::Social, Self::Sweat, Self::Depend];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ft => "ft",
            Self::Social => "social",
            Self::Sweat => "sweat",
            Self::Depend => "depend",
        }
    }

    /// Adds `count` users of this kind to the runner.
    pub fn spawn(
        self,
        runner: &mut Runner<SharedContext>,
        count: usize,
        task_weights: &HashMap<String, u32>,
    ) -> Result<(), TaskTableError> {
        match self {
            Self::Ft => runner.spawn_users::<ft::FtTransferUser>(count, task_weights),
            Self::Social => runner.spawn_users::<social::SocialDbUser>(count, task_weights),
            Self::Sweat => runner.spawn_users::<sweat::SweatUser>(count, task_weights),
            Self::Depend => runner.spawn_users::<depend::DependencyBomber>(count, task_weights),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown workload '{0}', expected one of ft, social, sweat, depend")]
pub struct UnknownWorkload(String);

impl FromStr for WorkloadKind {
    type Err = UnknownWorkload;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownWorkload(s.to_owned()))
    }
}
