//! Sweat: a fungible token whose oracles mint tokens for walked steps in
//! large batches.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use loadgen_core::{
    Account, AccountId, NodeProxy, SharedAccount,
    scenario::{DynError, TaskFuture, TaskTable, UserId, VirtualUser},
    submission::SubmissionError,
    transaction::{Balance, FunctionCall, FunctionCallAction, Gas, TGAS},
};
use rand::{Rng as _, thread_rng};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    deploy_code,
    ft::{FT_STORAGE_DEPOSIT, FtContract, storage_deposit, transfer_ft},
    user::NearUser,
};
use crate::context::SharedContext;

pub const SWEAT_INITIAL_MINT: Balance = 1_000_000_000_000;
const SWEAT_CALL_GAS: Gas = 300 * TGAS;
/// Registry size the storage stress task grows the contract state to.
pub const LARGE_STATE_USERS: usize = 1_000;
/// Filler users get ids far above the ones the runner hands out.
const FILLER_ID_BASE: UserId = 1 << 32;

fn sweat_call(signer: &AccountId, contract: &AccountId, method: &str, args: &Value) -> FunctionCall {
    FunctionCall::new(
        signer.clone(),
        contract.clone(),
        FunctionCallAction::json(method, args, SWEAT_CALL_GAS, 0),
    )
}

/// `new` without a postfix, so every account id key gets hashed.
#[must_use]
pub fn init_sweat(contract: &AccountId) -> FunctionCall {
    sweat_call(contract, contract, "new", &json!({ "postfix": null }))
}

/// Only the contract account itself may add oracles.
#[must_use]
pub fn add_oracle(contract: &AccountId, oracle: &AccountId) -> FunctionCall {
    sweat_call(contract, contract, "add_oracle", &json!({ "account_id": oracle }))
}

#[must_use]
pub fn tge_mint(contract: &AccountId, account_id: &AccountId, amount: Balance) -> FunctionCall {
    sweat_call(
        contract,
        contract,
        "tge_mint",
        &json!({ "account_id": account_id, "amount": amount.to_string() }),
    )
}

/// `record_batch` signed by an oracle: `[[account_id, steps], ...]`.
#[must_use]
pub fn record_batch(
    contract: &AccountId,
    oracle: &AccountId,
    steps_batch: &[(AccountId, u32)],
) -> FunctionCall {
    let steps_batch: Vec<Value> = steps_batch
        .iter()
        .map(|(account_id, steps)| json!([account_id, steps]))
        .collect();
    sweat_call(oracle, contract, "record_batch", &json!({ "steps_batch": steps_batch }))
}

pub struct SweatContract {
    ft: FtContract,
    oracle: SharedAccount,
    fillers: AtomicU64,
}

impl SweatContract {
    #[must_use]
    pub fn new(account: Account, oracle: Account) -> Self {
        Self {
            ft: FtContract::new(account),
            oracle: SharedAccount::new(oracle),
            fillers: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &AccountId {
        self.ft.id()
    }

    #[must_use]
    pub const fn oracle(&self) -> &SharedAccount {
        &self.oracle
    }

    /// Token bookkeeping shared with the plain FT workload.
    #[must_use]
    pub const fn token(&self) -> &FtContract {
        &self.ft
    }

    /// Unlike FT, the contract starts without a supply: it registers itself
    /// and mints its initial funds after adding the oracle.
    pub async fn install(&self, node: &NodeProxy, code: Arc<[u8]>) -> Result<(), SubmissionError> {
        let account = self.ft.account();
        let id = self.id();
        let init = [
            init_sweat(id),
            add_oracle(id, self.oracle.id()),
            storage_deposit(id, id, id, FT_STORAGE_DEPOSIT),
            tge_mint(id, id, SWEAT_INITIAL_MINT),
        ];
        deploy_code(node, account, code, &init).await?;
        info!(contract = %id, oracle = %self.oracle.id(), "sweat contract installed");
        Ok(())
    }

    /// Allows this contract's oracle to mint. Needed on its own when the
    /// contract is reused but the oracle account is new.
    pub async fn register_oracle(&self, node: &NodeProxy) -> Result<(), SubmissionError> {
        node.send_tx_shared(&add_oracle(self.id(), self.oracle.id()), self.ft.account())
            .await?;
        Ok(())
    }

    pub async fn register_user(
        &self,
        node: &NodeProxy,
        user: &mut Account,
    ) -> Result<(), SubmissionError> {
        self.ft.register_user(node, user).await
    }

    /// Records `batch_size` random receivers with 1000..=3000 steps each.
    pub async fn record_steps(
        &self,
        node: &NodeProxy,
        exclude: &AccountId,
        batch_size: usize,
    ) -> Result<(), SubmissionError> {
        let steps_batch: Vec<(AccountId, u32)> = {
            let mut rng = thread_rng();
            self.ft
                .random_receivers(exclude, batch_size)
                .into_iter()
                .map(|account_id| (account_id, rng.gen_range(1_000..=3_000)))
                .collect()
        };
        let tx = record_batch(self.id(), self.oracle.id(), &steps_batch);
        node.send_tx_shared(&tx, &self.oracle).await?;
        Ok(())
    }

    fn next_filler_id(&self) -> UserId {
        FILLER_ID_BASE + self.fillers.fetch_add(1, Ordering::Relaxed)
    }
}

/// Sends sweat to random holders and, acting through the oracle, records
/// step batches.
pub struct SweatUser {
    user: NearUser,
}

impl SweatUser {
    async fn ft_transfer(&mut self) -> Result<(), DynError> {
        let ctx = Arc::clone(self.user.ctx());
        let sweat = ctx.require_sweat()?;
        let receiver = sweat.token().random_receiver(self.user.account_id());
        let tx = transfer_ft(sweat.id(), self.user.account_id(), &receiver, 1);
        self.user.send_tx(&tx).await?;
        Ok(())
    }

    async fn record_single_batch(&mut self) -> Result<(), DynError> {
        let ctx = Arc::clone(self.user.ctx());
        let sweat = ctx.require_sweat()?;
        let batch_size = thread_rng()
            .gen_range(100..=150)
            .min(sweat.token().registry().len());
        sweat
            .record_steps(ctx.node(), self.user.account_id(), batch_size)
            .await?;
        Ok(())
    }

    /// Grows the contract state to [`LARGE_STATE_USERS`] holders, then
    /// records a batch close to the 300 TGas limit.
    async fn record_batch_of_large_batches(&mut self) -> Result<(), DynError> {
        let ctx = Arc::clone(self.user.ctx());
        let sweat = ctx.require_sweat()?;
        while sweat.token().registry().len() < LARGE_STATE_USERS {
            let id = sweat.next_filler_id();
            let mut filler = NearUser::register(id, Arc::clone(&ctx)).await?;
            sweat.register_user(ctx.node(), filler.account_mut()).await?;
        }

        let batch_size = thread_rng().gen_range(700..=750);
        sweat
            .record_steps(ctx.node(), self.user.account_id(), batch_size)
            .await?;
        Ok(())
    }
}

fn ft_transfer(user: &mut SweatUser) -> TaskFuture<'_> {
    Box::pin(user.ft_transfer())
}

fn record_single_batch(user: &mut SweatUser) -> TaskFuture<'_> {
    Box::pin(user.record_single_batch())
}

fn record_batch_of_large_batches(user: &mut SweatUser) -> TaskFuture<'_> {
    Box::pin(user.record_batch_of_large_batches())
}

#[async_trait]
impl VirtualUser for SweatUser {
    type Context = SharedContext;

    fn kind() -> &'static str {
        "sweat"
    }

    async fn on_start(id: UserId, ctx: Arc<SharedContext>) -> Result<Self, DynError> {
        let sweat = ctx.require_sweat()?;
        let mut user = NearUser::register(id, Arc::clone(&ctx)).await?;
        sweat.register_user(ctx.node(), user.account_mut()).await?;
        debug!(user = id, account = %user.account_id(), contract = %sweat.id(), "sweat user ready");
        Ok(Self { user })
    }

    /// The stress task only runs when enabled through task weight overrides.
    fn tasks() -> TaskTable<Self> {
        TaskTable::new()
            .with("ft_transfer", 3, ft_transfer)
            .with("record_single_batch", 1, record_single_batch)
            .with("record_batch_of_large_batches", 0, record_batch_of_large_batches)
    }
}
