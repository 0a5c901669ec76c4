//! Dependency bomb: calls whose receipts fan out into many dependent
//! receipts on the target contract.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use loadgen_core::{
    Account, AccountId, InMemorySigner, NodeProxy,
    accounts::{AccountIdError, AccountIdGenerator},
    scenario::{DynError, TaskFuture, TaskTable, UserId, VirtualUser},
    submission::SubmissionError,
    transaction::{Balance, DeployContract, FunctionCall, FunctionCallAction, Gas, TGAS, near},
};
use rand::{seq::SliceRandom as _, thread_rng};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use super::user::NearUser;
use crate::context::SharedContext;

pub const DEPENDENCY_ACCOUNT_BALANCE: Balance = near(10);
const BOMB_GAS: Gas = 300 * TGAS;

#[derive(Debug, Error)]
#[error("no dependency contracts were deployed")]
pub struct NoDependencyContracts;

#[must_use]
pub fn depend_a_lot(sender: &AccountId, contract: &AccountId) -> FunctionCall {
    FunctionCall::new(
        sender.clone(),
        contract.clone(),
        FunctionCallAction::json("depend_a_lot", &json!({}), BOMB_GAS, 0),
    )
}

/// Fresh `_dep` sub-accounts of `funding`, not yet created on chain.
pub fn dependency_accounts(
    account_ids: &AccountIdGenerator,
    funding: &AccountId,
    count: usize,
) -> Result<Vec<Account>, AccountIdError> {
    (0..count)
        .map(|_| {
            let account_id = account_ids.random_account_id(funding, "_dep")?;
            Ok(Account::new(InMemorySigner::from_random(account_id), 0))
        })
        .collect()
}

/// Deploys `code` to every account concurrently, each with its own nonce.
pub async fn deploy_dependency_contracts(
    node: &NodeProxy,
    accounts: &mut [Account],
    code: Arc<[u8]>,
) -> Result<(), SubmissionError> {
    try_join_all(accounts.iter_mut().map(|account| {
        let tx = DeployContract {
            account_id: account.id().clone(),
            code: Arc::clone(&code),
            init: Vec::new(),
        };
        async move { node.send_tx(&tx, account).await }
    }))
    .await?;
    info!(count = accounts.len(), "dependency contracts deployed");
    Ok(())
}

/// Hammers one dependency contract picked at start.
pub struct DependencyBomber {
    user: NearUser,
    target: AccountId,
}

impl DependencyBomber {
    async fn bomb(&mut self) -> Result<(), DynError> {
        let tx = depend_a_lot(self.user.account_id(), &self.target);
        self.user.send_tx(&tx).await?;
        Ok(())
    }
}

fn bomb(user: &mut DependencyBomber) -> TaskFuture<'_> {
    Box::pin(user.bomb())
}

#[async_trait]
impl VirtualUser for DependencyBomber {
    type Context = SharedContext;

    fn kind() -> &'static str {
        "depend"
    }

    async fn on_start(id: UserId, ctx: Arc<SharedContext>) -> Result<Self, DynError> {
        let target = ctx
            .dependency_contracts()
            .choose(&mut thread_rng())
            .cloned()
            .ok_or(NoDependencyContracts)?;
        let user = NearUser::register(id, ctx).await?;
        debug!(user = id, account = %user.account_id(), %target, "dependency bomber ready");
        Ok(Self { user, target })
    }

    fn tasks() -> TaskTable<Self> {
        TaskTable::new().with("bomb", 1, bomb)
    }
}

#[cfg(test)]
mod tests {
    use loadgen_core::{RetryPolicy, SharedAccount, rpc::mock::MockNode};

    use super::*;

    #[tokio::test]
    async fn deploys_to_every_dependency_account() {
        let node = Arc::new(MockNode::new());
        let signer = InMemorySigner::from_random(AccountId::new("funding.test").unwrap());
        node.add_account(signer.account_id().clone(), signer.public_key(), 0);
        let funding = SharedAccount::new(Account::new(signer, 0));
        let proxy = NodeProxy::new(node.clone(), RetryPolicy::default());

        let mut accounts =
            dependency_accounts(&AccountIdGenerator::from_seed(3), funding.id(), 8).unwrap();
        proxy
            .prepare_accounts(&mut accounts, &funding, DEPENDENCY_ACCOUNT_BALANCE, "dep")
            .await
            .unwrap();
        deploy_dependency_contracts(&proxy, &mut accounts, Arc::from(&b"depend"[..]))
            .await
            .unwrap();

        assert_eq!(accounts.len(), 8);
        for account in &accounts {
            assert!(account.id().as_str().ends_with("_dep.funding.test"));
            assert!(node.has_contract(account.id()));
        }
        assert_eq!(funding.lock().await.nonce(), 8);
    }

    #[test]
    fn bomb_sends_empty_args() {
        let tx = depend_a_lot(
            &AccountId::new("alice.test").unwrap(),
            &AccountId::new("dep.test").unwrap(),
        );
        assert_eq!(tx.calls()[0].method_name, "depend_a_lot");
        assert_eq!(tx.calls()[0].args_json().unwrap(), json!({}));
    }
}
