use std::sync::Arc;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    accounts::{Account, AccountId, Nonce, SharedAccount},
    rpc::{AccountView, NodeRpc, Receipt, RpcError},
    submission::{RetryPolicy, SubmissionError, Submitter},
    transaction::{Balance, CreateSubAccount, Transaction},
};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("failed to read nonce of {account}: {source}")]
    Nonce {
        account: AccountId,
        #[source]
        source: RpcError,
    },
}

/// Facade over one node: raw queries plus retried submission.
#[derive(Clone)]
pub struct NodeProxy {
    rpc: Arc<dyn NodeRpc>,
    submitter: Submitter,
}

impl NodeProxy {
    #[must_use]
    pub fn new(rpc: Arc<dyn NodeRpc>, policy: RetryPolicy) -> Self {
        Self {
            submitter: Submitter::new(Arc::clone(&rpc), policy),
            rpc,
        }
    }

    #[must_use]
    pub fn rpc(&self) -> &dyn NodeRpc {
        self.rpc.as_ref()
    }

    pub async fn send_tx(
        &self,
        tx: &dyn Transaction,
        account: &mut Account,
    ) -> Result<Receipt, SubmissionError> {
        self.submitter.submit(tx, account).await
    }

    pub async fn send_tx_shared(
        &self,
        tx: &dyn Transaction,
        account: &SharedAccount,
    ) -> Result<Receipt, SubmissionError> {
        self.submitter.submit_shared(tx, account).await
    }

    pub async fn refresh_nonce(&self, account: &mut Account) -> Result<Nonce, ProxyError> {
        account
            .refresh_nonce(self.rpc())
            .await
            .map_err(|source| ProxyError::Nonce {
                account: account.id().clone(),
                source,
            })
    }

    pub async fn view_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountView>, RpcError> {
        self.rpc.view_account(account_id).await
    }

    /// Creates and funds `account` on chain from `funding`, then loads the
    /// nonce its fresh access key starts from.
    pub async fn create_sub_account(
        &self,
        funding: &mut Account,
        account: &mut Account,
        balance: Balance,
    ) -> Result<Receipt, ProxyError> {
        let tx = CreateSubAccount {
            signer_id: funding.id().clone(),
            new_account_id: account.id().clone(),
            public_key: account.public_key(),
            balance,
        };
        let receipt = self.send_tx(&tx, funding).await?;
        self.refresh_nonce(account).await?;
        Ok(receipt)
    }

    /// Batch-creates `accounts` from the shared funding account.
    ///
    /// The funding lock is held for all creations so its nonces stay in
    /// submission order; the new accounts' nonces are then read in parallel.
    pub async fn prepare_accounts(
        &self,
        accounts: &mut [Account],
        funding: &SharedAccount,
        balance_each: Balance,
        label: &str,
    ) -> Result<(), ProxyError> {
        info!(label, count = accounts.len(), funding = %funding.id(), "preparing accounts");
        {
            let mut funding = funding.lock().await;
            for account in accounts.iter() {
                let tx = CreateSubAccount {
                    signer_id: funding.id().clone(),
                    new_account_id: account.id().clone(),
                    public_key: account.public_key(),
                    balance: balance_each,
                };
                self.send_tx(&tx, &mut funding).await?;
                debug!(label, account = %account.id(), "account created");
            }
        }

        try_join_all(
            accounts
                .iter_mut()
                .map(|account| self.refresh_nonce(account)),
        )
        .await?;
        info!(label, count = accounts.len(), "accounts ready");
        Ok(())
    }
}
