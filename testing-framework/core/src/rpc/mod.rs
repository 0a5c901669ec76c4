mod client;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
mod types;

use async_trait::async_trait;
pub use client::{DEFAULT_RPC_TIMEOUT, JsonRpcClient};
use serde_json::Value;
use thiserror::Error;
pub use types::{classify_error, receipt_from_outcome};

use crate::{
    accounts::{AccountId, Nonce, PublicKey},
    transaction::{CryptoHash, SignedPayload, SigningError},
};

/// Whether a failed call is worth repeating with a freshly signed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc call timed out: {0}")]
    Timeout(String),
    #[error("node temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("nonce rejected by node: {0}")]
    StaleNonce(String),
    #[error("transaction expired: {0}")]
    Expired(String),
    #[error("transaction not yet known to node: {0}")]
    UnknownTransaction(String),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("transaction execution failed: {0}")]
    ExecutionFailed(String),
    #[error("unknown account or access key: {0}")]
    UnknownAccount(String),
    #[error("rpc handler error {name}: {detail}")]
    Handler { name: String, detail: String },
    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl RpcError {
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Transport(_)
            | Self::Timeout(_)
            | Self::Unavailable(_)
            | Self::StaleNonce(_)
            | Self::Expired(_)
            | Self::UnknownTransaction(_) => FailureClass::Transient,
            Self::InvalidTransaction(_)
            | Self::ExecutionFailed(_)
            | Self::UnknownAccount(_)
            | Self::Handler { .. }
            | Self::MalformedResponse(_)
            | Self::Signing(_) => FailureClass::Permanent,
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), FailureClass::Transient)
    }
}

/// The parts of an on-chain account that contract setup looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountView {
    pub code_hash: CryptoHash,
}

impl AccountView {
    /// Accounts without a contract report the all-zero code hash.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code_hash != CryptoHash::default()
    }
}

/// Confirmation returned once the node executed a transaction.
#[derive(Clone, Debug)]
pub struct Receipt {
    pub transaction_hash: CryptoHash,
    pub outcome: Value,
}

/// The node operations the load generator relies on.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Hash of a recent final block, used as the transaction validity anchor.
    async fn recent_block_hash(&self) -> Result<CryptoHash, RpcError>;

    async fn access_key_nonce(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> Result<Nonce, RpcError>;

    /// `None` when the account does not exist.
    async fn view_account(&self, account_id: &AccountId) -> Result<Option<AccountView>, RpcError>;

    /// Submits the payload and waits for its execution outcome.
    async fn send_transaction(&self, payload: &SignedPayload) -> Result<Receipt, RpcError>;
}
