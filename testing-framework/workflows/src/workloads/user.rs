use std::sync::Arc;

use loadgen_core::{
    Account, AccountId, InMemorySigner,
    rpc::Receipt,
    scenario::{DynError, UserId},
    submission::SubmissionError,
    transaction::{CreateSubAccount, Transaction},
};
use tracing::debug;

use crate::context::SharedContext;

/// A fresh on-chain account owned by one virtual user.
pub struct NearUser {
    account: Account,
    ctx: Arc<SharedContext>,
}

impl NearUser {
    /// Creates `<random><_userN>.<funding>` from the funding account and
    /// reads the new key's nonce.
    pub async fn register(id: UserId, ctx: Arc<SharedContext>) -> Result<Self, DynError> {
        let funding = ctx.funding();
        let account_id = ctx
            .account_ids()
            .random_account_id(funding.id(), &format!("_user{id}"))?;
        let mut account = Account::new(InMemorySigner::from_random(account_id), 0);

        let create = CreateSubAccount {
            signer_id: funding.id().clone(),
            new_account_id: account.id().clone(),
            public_key: account.public_key(),
            balance: ctx.user_balance(),
        };
        ctx.node().send_tx_shared(&create, funding).await?;
        ctx.node().refresh_nonce(&mut account).await?;
        debug!(user = id, account = %account.id(), "user account created");

        Ok(Self { account, ctx })
    }

    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        self.account.id()
    }

    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }

    #[must_use]
    pub const fn ctx(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    pub async fn send_tx(&mut self, tx: &dyn Transaction) -> Result<Receipt, SubmissionError> {
        self.ctx.node().send_tx(tx, &mut self.account).await
    }
}
