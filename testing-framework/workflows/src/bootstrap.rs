use std::{collections::BTreeSet, io, path::PathBuf, sync::Arc};

use loadgen_core::{
    Account, AccountId, InMemorySigner, NodeProxy, ProxyError, SharedAccount,
    accounts::{AccountIdError, AccountIdGenerator},
    rpc::RpcError,
    submission::SubmissionError,
    transaction::{Balance, near},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
    context::SharedContext,
    workloads::{
        WorkloadKind,
        depend::{DEPENDENCY_ACCOUNT_BALANCE, deploy_dependency_contracts, dependency_accounts},
        ft::FtContract,
        social::SocialContract,
        sweat::SweatContract,
    },
};

pub const DEFAULT_CONTRACT_BALANCE: Balance = near(50_000);
pub const DEFAULT_USER_BALANCE: Balance = near(10);
pub const DEFAULT_DEPENDENCY_ACCOUNTS: usize = 8;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to read {workload} contract code from {path}: {source}")]
    Code {
        workload: WorkloadKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid contract account id: {0}")]
    AccountId(#[from] AccountIdError),
    #[error("failed to look up {account}: {source}")]
    Lookup {
        account: AccountId,
        #[source]
        source: RpcError,
    },
    #[error(transparent)]
    Accounts(#[from] ProxyError),
    #[error("{workload} contract setup failed: {source}")]
    Install {
        workload: WorkloadKind,
        #[source]
        source: SubmissionError,
    },
}

/// Contract code locations, one per workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractPaths {
    pub ft: PathBuf,
    pub social: PathBuf,
    pub sweat: PathBuf,
    pub depend: PathBuf,
}

impl Default for ContractPaths {
    fn default() -> Self {
        Self {
            ft: PathBuf::from("res/fungible_token.wasm"),
            social: PathBuf::from("res/social_db.wasm"),
            sweat: PathBuf::from("res/sweat.wasm"),
            depend: PathBuf::from("res/depend.wasm"),
        }
    }
}

impl ContractPaths {
    #[must_use]
    pub const fn path(&self, workload: WorkloadKind) -> &PathBuf {
        match workload {
            WorkloadKind::Ft => &self.ft,
            WorkloadKind::Social => &self.social,
            WorkloadKind::Sweat => &self.sweat,
            WorkloadKind::Depend => &self.depend,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    /// Only these workloads get contracts provisioned.
    pub workloads: BTreeSet<WorkloadKind>,
    pub contracts: ContractPaths,
    pub contract_balance: Balance,
    pub user_balance: Balance,
    pub dependency_accounts: usize,
    /// Distinguishes contract accounts of separate runs under one funding
    /// account. Reusing a run id reuses its contracts.
    pub run_id: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            workloads: WorkloadKind::ALL.into_iter().collect(),
            contracts: ContractPaths::default(),
            contract_balance: DEFAULT_CONTRACT_BALANCE,
            user_balance: DEFAULT_USER_BALANCE,
            dependency_accounts: DEFAULT_DEPENDENCY_ACCOUNTS,
            run_id: String::new(),
        }
    }
}

/// Contract bytes read once, shared by every deployment.
#[derive(Default)]
struct ContractCode {
    ft: Option<Arc<[u8]>>,
    social: Option<Arc<[u8]>>,
    sweat: Option<Arc<[u8]>>,
    depend: Option<Arc<[u8]>>,
}

impl ContractCode {
    async fn load(config: &BootstrapConfig) -> Result<Self, BootstrapError> {
        let mut code = Self::default();
        for &workload in &config.workloads {
            let path = config.contracts.path(workload);
            let bytes: Arc<[u8]> = tokio::fs::read(path)
                .await
                .map_err(|source| BootstrapError::Code {
                    workload,
                    path: path.clone(),
                    source,
                })?
                .into();
            info!(%workload, path = %path.display(), size = bytes.len(), "contract code loaded");
            let slot = match workload {
                WorkloadKind::Ft => &mut code.ft,
                WorkloadKind::Social => &mut code.social,
                WorkloadKind::Sweat => &mut code.sweat,
                WorkloadKind::Depend => &mut code.depend,
            };
            *slot = Some(bytes);
        }
        Ok(code)
    }
}

/// A contract account either freshly created by this run or left over from
/// an earlier run with the same run id.
struct Provisioned {
    account: Account,
    created: bool,
    /// Code and init calls land in one transaction, so deployed code means
    /// an initialized contract.
    initialized: bool,
}

/// One-time provisioning of everything the users need.
///
/// Funding-signed transactions go out strictly one after another. Contract
/// deployments and initialization are signed by the contract accounts
/// themselves and run concurrently.
pub struct Bootstrap {
    node: NodeProxy,
    funding: Account,
    account_ids: AccountIdGenerator,
    config: BootstrapConfig,
}

impl Bootstrap {
    #[must_use]
    pub fn new(node: NodeProxy, funding: Account, config: BootstrapConfig) -> Self {
        Self {
            node,
            funding,
            account_ids: AccountIdGenerator::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_account_ids(mut self, account_ids: AccountIdGenerator) -> Self {
        self.account_ids = account_ids;
        self
    }

    pub async fn run(self) -> Result<SharedContext, BootstrapError> {
        let Self {
            node,
            mut funding,
            account_ids,
            config,
        } = self;
        let code = ContractCode::load(&config).await?;

        node.refresh_nonce(&mut funding).await?;
        info!(
            funding = %funding.id(),
            nonce = funding.nonce(),
            workloads = ?config.workloads,
            "bootstrap started"
        );
        let funding = SharedAccount::new(funding);
        let run_id = &config.run_id;
        let contract_id = |name: &str, suffix: &str| {
            funding
                .id()
                .sub_account(&format!("{name}{run_id}{suffix}"))
        };

        let ft = match &code.ft {
            Some(code) => {
                let contract =
                    provision(&node, &funding, contract_id("ft", "")?, config.contract_balance).await?;
                Some((contract, Arc::clone(code)))
            }
            None => None,
        };
        let social = match &code.social {
            Some(code) => {
                let contract =
                    provision(&node, &funding, contract_id("social", "")?, config.contract_balance)
                        .await?;
                Some((contract, Arc::clone(code)))
            }
            None => None,
        };
        let sweat = match &code.sweat {
            Some(code) => {
                let oracle = provision(
                    &node,
                    &funding,
                    contract_id("sweat", "_oracle")?,
                    config.contract_balance,
                )
                .await?;
                let contract =
                    provision(&node, &funding, contract_id("sweat", "")?, config.contract_balance)
                        .await?;
                Some((contract, oracle, Arc::clone(code)))
            }
            None => None,
        };
        let mut dependencies = match &code.depend {
            Some(_) => {
                let mut accounts =
                    dependency_accounts(&account_ids, funding.id(), config.dependency_accounts)?;
                node.prepare_accounts(
                    &mut accounts,
                    &funding,
                    DEPENDENCY_ACCOUNT_BALANCE,
                    "prep dep acc",
                )
                .await?;
                accounts
            }
            None => Vec::new(),
        };
        info!("funding phase complete, installing contracts");

        let ft = ft.map(|(provisioned, code)| {
            (FtContract::new(provisioned.account), provisioned.initialized, code)
        });
        let social = social.map(|(provisioned, code)| {
            (SocialContract::new(provisioned.account), provisioned.initialized, code)
        });
        let sweat = sweat.map(|(provisioned, oracle, code)| {
            (
                SweatContract::new(provisioned.account, oracle.account),
                provisioned.initialized,
                oracle.created,
                code,
            )
        });

        tokio::try_join!(
            async {
                if let Some((contract, false, code)) = &ft {
                    contract
                        .install(&node, Arc::clone(code))
                        .await
                        .map_err(|source| install_failed(WorkloadKind::Ft, source))?;
                    info!(contract = %contract.id(), "ft contract ready");
                }
                Ok::<_, BootstrapError>(())
            },
            async {
                if let Some((contract, false, code)) = &social {
                    contract
                        .install(&node, Arc::clone(code))
                        .await
                        .map_err(|source| install_failed(WorkloadKind::Social, source))?;
                    info!(contract = %contract.id(), "social contract ready");
                }
                Ok::<_, BootstrapError>(())
            },
            async {
                let installed = match &sweat {
                    Some((contract, false, _, code)) => {
                        contract.install(&node, Arc::clone(code)).await
                    }
                    Some((contract, true, true, _)) => contract.register_oracle(&node).await,
                    _ => Ok(()),
                };
                installed.map_err(|source| install_failed(WorkloadKind::Sweat, source))
            },
            async {
                if let Some(code) = &code.depend {
                    deploy_dependency_contracts(&node, &mut dependencies, Arc::clone(code))
                        .await
                        .map_err(|source| install_failed(WorkloadKind::Depend, source))?;
                }
                Ok::<_, BootstrapError>(())
            },
        )?;

        let context = SharedContext {
            node,
            funding,
            account_ids,
            user_balance: config.user_balance,
            ft: ft.map(|(contract, ..)| contract),
            social: social.map(|(contract, ..)| contract),
            sweat: sweat.map(|(contract, ..)| contract),
            dependency_contracts: dependencies
                .iter()
                .map(|account| account.id().clone())
                .collect(),
        };
        info!("bootstrap complete");
        Ok(context)
    }
}

const fn install_failed(workload: WorkloadKind, source: SubmissionError) -> BootstrapError {
    BootstrapError::Install { workload, source }
}

/// Creates `account_id` from the funding account unless it already exists.
///
/// Contract keys derive from the account id, so an account left by an
/// earlier run with the same run id can still be signed for. Such an account
/// counts as initialized only if it carries code.
async fn provision(
    node: &NodeProxy,
    funding: &SharedAccount,
    account_id: AccountId,
    balance: Balance,
) -> Result<Provisioned, BootstrapError> {
    let signer = InMemorySigner::from_seed(account_id.clone(), account_id.as_str());
    let mut account = Account::new(signer, 0);
    let view = node
        .view_account(account.id())
        .await
        .map_err(|source| BootstrapError::Lookup {
            account: account.id().clone(),
            source,
        })?;

    if let Some(view) = view {
        node.refresh_nonce(&mut account).await?;
        let initialized = view.has_code();
        info!(
            account = %account.id(),
            nonce = account.nonce(),
            initialized,
            "reusing existing contract account"
        );
        return Ok(Provisioned {
            account,
            created: false,
            initialized,
        });
    }

    let mut funding = funding.lock().await;
    node.create_sub_account(&mut funding, &mut account, balance)
        .await?;
    info!(account = %account.id(), "contract account created");
    Ok(Provisioned {
        account,
        created: true,
        initialized: false,
    })
}
