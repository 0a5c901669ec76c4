use loadgen_core::{
    AccountId, NodeProxy, SharedAccount, accounts::AccountIdGenerator, transaction::Balance,
};
use thiserror::Error;

use crate::workloads::{ft::FtContract, social::SocialContract, sweat::SweatContract};

#[derive(Debug, Error)]
#[error("{workload} workload was not bootstrapped in this run")]
pub struct NotBootstrapped {
    pub workload: &'static str,
}

/// Everything bootstrap provisioned, shared read-only with every user.
pub struct SharedContext {
    pub(crate) node: NodeProxy,
    pub(crate) funding: SharedAccount,
    pub(crate) account_ids: AccountIdGenerator,
    pub(crate) user_balance: Balance,
    pub(crate) ft: Option<FtContract>,
    pub(crate) social: Option<SocialContract>,
    pub(crate) sweat: Option<SweatContract>,
    pub(crate) dependency_contracts: Vec<AccountId>,
}

impl SharedContext {
    #[must_use]
    pub const fn node(&self) -> &NodeProxy {
        &self.node
    }

    #[must_use]
    pub const fn funding(&self) -> &SharedAccount {
        &self.funding
    }

    #[must_use]
    pub const fn account_ids(&self) -> &AccountIdGenerator {
        &self.account_ids
    }

    /// Balance each new user account is created with.
    #[must_use]
    pub const fn user_balance(&self) -> Balance {
        self.user_balance
    }

    #[must_use]
    pub const fn ft(&self) -> Option<&FtContract> {
        self.ft.as_ref()
    }

    #[must_use]
    pub const fn social(&self) -> Option<&SocialContract> {
        self.social.as_ref()
    }

    #[must_use]
    pub const fn sweat(&self) -> Option<&SweatContract> {
        self.sweat.as_ref()
    }

    #[must_use]
    pub fn dependency_contracts(&self) -> &[AccountId] {
        &self.dependency_contracts
    }

    pub fn require_ft(&self) -> Result<&FtContract, NotBootstrapped> {
        self.ft.as_ref().ok_or(NotBootstrapped { workload: "ft" })
    }

    pub fn require_social(&self) -> Result<&SocialContract, NotBootstrapped> {
        self.social
            .as_ref()
            .ok_or(NotBootstrapped { workload: "social" })
    }

    pub fn require_sweat(&self) -> Result<&SweatContract, NotBootstrapped> {
        self.sweat
            .as_ref()
            .ok_or(NotBootstrapped { workload: "sweat" })
    }
}
