mod id;
mod keys;

use std::{path::Path, sync::Arc};

pub use id::{AccountId, AccountIdError, AccountIdGenerator};
pub use keys::{InMemorySigner, KeyError, KeyFile, PublicKey, SecretKey, Signature};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::rpc::{NodeRpc, RpcError};

pub type Nonce = u64;

/// A transaction sender: signing key plus the last nonce it handed out.
///
/// The counter only moves forward in-process through [`Account::next_nonce`];
/// [`Account::refresh_nonce`] is the single place it is overwritten from the
/// network, which happens once right after the account is created or loaded.
#[derive(Debug)]
pub struct Account {
    signer: InMemorySigner,
    nonce: Nonce,
}

impl Account {
    #[must_use]
    pub const fn new(signer: InMemorySigner, nonce: Nonce) -> Self {
        Self { signer, nonce }
    }

    /// Loads credentials from a key file. The nonce starts at zero until
    /// [`Account::refresh_nonce`] reads the on-chain value.
    pub fn from_key_file(path: &Path) -> Result<Self, KeyError> {
        Ok(Self::new(InMemorySigner::from_file(path)?, 0))
    }

    #[must_use]
    pub const fn id(&self) -> &AccountId {
        self.signer.account_id()
    }

    #[must_use]
    pub const fn signer(&self) -> &InMemorySigner {
        &self.signer
    }

    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// Last nonce issued (or read from the network).
    #[must_use]
    pub const fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Reserves the next unused nonce.
    pub fn next_nonce(&mut self) -> Nonce {
        self.nonce += 1;
        self.nonce
    }

    /// Replaces the local counter with the access key's on-chain nonce.
    pub async fn refresh_nonce(&mut self, rpc: &dyn NodeRpc) -> Result<Nonce, RpcError> {
        let nonce = rpc
            .access_key_nonce(self.signer.account_id(), &self.signer.public_key())
            .await?;
        debug!(account = %self.id(), nonce, "refreshed nonce");
        self.nonce = nonce;
        Ok(nonce)
    }
}

/// An [`Account`] used by several tasks (funding, contract owner, oracle).
///
/// Holding the guard serializes transactions so that nonces keep matching
/// submission order.
#[derive(Clone, Debug)]
pub struct SharedAccount {
    id: AccountId,
    inner: Arc<Mutex<Account>>,
}

impl SharedAccount {
    #[must_use]
    pub fn new(account: Account) -> Self {
        Self {
            id: account.id().clone(),
            inner: Arc::new(Mutex::new(account)),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &AccountId {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, Account> {
        self.inner.lock().await
    }
}
