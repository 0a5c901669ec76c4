//! NEP-141 fungible token workload.

use std::sync::Arc;

use async_trait::async_trait;
use loadgen_core::{
    Account, AccountId, NodeProxy, SharedAccount, WorkloadRegistry,
    scenario::{DynError, TaskFuture, TaskTable, UserId, VirtualUser},
    submission::SubmissionError,
    transaction::{Balance, FunctionCall, FunctionCallAction, Gas, TGAS},
};
use rand::thread_rng;
use serde_json::json;
use tracing::debug;

use super::{deploy_code, user::NearUser};
use crate::context::SharedContext;

pub const FT_TOTAL_SUPPLY: Balance = 1_000_000_000_000_000_000_000_000_000_000_000;
/// Storage staking for one token holder: 0.1 NEAR.
pub const FT_STORAGE_DEPOSIT: Balance = 100_000_000_000_000_000_000_000;
pub const INITIAL_USER_FT_BALANCE: Balance = 100_000_000;
const FT_CALL_GAS: Gas = 300 * TGAS;
/// NEP-141 requires exactly one yocto on transfers.
const ONE_YOCTO: Balance = 1;

#[must_use]
pub fn init_ft(contract: &AccountId) -> FunctionCall {
    FunctionCall::new(
        contract.clone(),
        contract.clone(),
        FunctionCallAction::json(
            "new_default_meta",
            &json!({
                "owner_id": contract,
                "total_supply": FT_TOTAL_SUPPLY.to_string(),
            }),
            FT_CALL_GAS,
            0,
        ),
    )
}

/// Registers `account_id` for storage on `contract`, paid by `signer`.
#[must_use]
pub fn storage_deposit(
    signer: &AccountId,
    contract: &AccountId,
    account_id: &AccountId,
    deposit: Balance,
) -> FunctionCall {
    FunctionCall::new(
        signer.clone(),
        contract.clone(),
        FunctionCallAction::json(
            "storage_deposit",
            &json!({ "account_id": account_id }),
            FT_CALL_GAS,
            deposit,
        ),
    )
}

#[must_use]
pub fn transfer_ft(
    contract: &AccountId,
    sender: &AccountId,
    receiver: &AccountId,
    amount: Balance,
) -> FunctionCall {
    FunctionCall::new(
        sender.clone(),
        contract.clone(),
        FunctionCallAction::json(
            "ft_transfer",
            &json!({
                "receiver_id": receiver,
                "amount": amount.to_string(),
            }),
            FT_CALL_GAS,
            ONE_YOCTO,
        ),
    )
}

/// A deployed token contract and the users registered with it.
pub struct FtContract {
    account: SharedAccount,
    registry: WorkloadRegistry,
}

impl FtContract {
    #[must_use]
    pub fn new(account: Account) -> Self {
        Self {
            account: SharedAccount::new(account),
            registry: WorkloadRegistry::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &AccountId {
        self.account.id()
    }

    #[must_use]
    pub const fn account(&self) -> &SharedAccount {
        &self.account
    }

    #[must_use]
    pub const fn registry(&self) -> &WorkloadRegistry {
        &self.registry
    }

    /// Deploys the code and mints the total supply to the contract itself.
    pub async fn install(&self, node: &NodeProxy, code: Arc<[u8]>) -> Result<(), SubmissionError> {
        deploy_code(node, &self.account, code, &[init_ft(self.id())]).await?;
        Ok(())
    }

    /// Storage deposit by the user, then an initial token grant from the
    /// contract. Only afterwards is the user visible to peers.
    pub async fn register_user(
        &self,
        node: &NodeProxy,
        user: &mut Account,
    ) -> Result<(), SubmissionError> {
        let user_id = user.id().clone();
        node.send_tx(
            &storage_deposit(&user_id, self.id(), &user_id, FT_STORAGE_DEPOSIT),
            user,
        )
        .await?;
        node.send_tx_shared(
            &transfer_ft(self.id(), self.id(), &user_id, INITIAL_USER_FT_BALANCE),
            &self.account,
        )
        .await?;
        self.registry.register(user_id);
        Ok(())
    }

    /// Registered peer other than `exclude`, or the contract account itself.
    #[must_use]
    pub fn random_receiver(&self, exclude: &AccountId) -> AccountId {
        self.registry
            .random_peer(&mut thread_rng(), exclude, self.id())
    }

    #[must_use]
    pub fn random_receivers(&self, exclude: &AccountId, count: usize) -> Vec<AccountId> {
        self.registry
            .random_peers(&mut thread_rng(), exclude, count)
    }
}

/// Registers with the token contract, then sends one token at a time to
/// random holders.
pub struct FtTransferUser {
    user: NearUser,
}

impl FtTransferUser {
    async fn ft_transfer(&mut self) -> Result<(), DynError> {
        let ctx = Arc::clone(self.user.ctx());
        let ft = ctx.require_ft()?;
        let receiver = ft.random_receiver(self.user.account_id());
        let tx = transfer_ft(ft.id(), self.user.account_id(), &receiver, 1);
        self.user.send_tx(&tx).await?;
        Ok(())
    }
}

fn ft_transfer(user: &mut FtTransferUser) -> TaskFuture<'_> {
    Box::pin(user.ft_transfer())
}

#[async_trait]
impl VirtualUser for FtTransferUser {
    type Context = SharedContext;

    fn kind() -> &'static str {
        "ft"
    }

    async fn on_start(id: UserId, ctx: Arc<SharedContext>) -> Result<Self, DynError> {
        let ft = ctx.require_ft()?;
        let mut user = NearUser::register(id, Arc::clone(&ctx)).await?;
        ft.register_user(ctx.node(), user.account_mut()).await?;
        debug!(user = id, account = %user.account_id(), contract = %ft.id(), "ft user ready");
        Ok(Self { user })
    }

    fn tasks() -> TaskTable<Self> {
        TaskTable::new().with("ft_transfer", 1, ft_transfer)
    }
}
