//! In-memory node used by tests: validates signatures and nonces, tracks
//! accounts, keys and deployed code, and can be scripted to fail.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{AccountView, NodeRpc, Receipt, RpcError};
use crate::{
    accounts::{AccountId, Nonce, PublicKey},
    transaction::{Action, CryptoHash, SignedPayload},
};

/// Mirrors the node's rule that a fresh access key starts at `height * 10^6`.
const ACCESS_KEY_NONCE_RANGE_MULTIPLIER: u64 = 1_000_000;

#[derive(Clone, Debug)]
pub struct SentTransaction {
    pub payload: SignedPayload,
    pub accepted: bool,
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub signer_id: AccountId,
    pub receiver_id: AccountId,
    pub method_name: String,
    pub args: Value,
}

#[derive(Default)]
struct MockState {
    height: u64,
    issued_hashes: HashSet<CryptoHash>,
    access_keys: HashMap<(AccountId, PublicKey), Nonce>,
    accounts: HashSet<AccountId>,
    contracts: HashMap<AccountId, CryptoHash>,
    scripted_failures: VecDeque<RpcError>,
    failing_methods: HashSet<String>,
    sent: Vec<SentTransaction>,
    calls: Vec<RecordedCall>,
}

#[derive(Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing account with one full access key.
    pub fn add_account(&self, account_id: AccountId, public_key: PublicKey, nonce: Nonce) {
        let mut state = self.state.lock();
        state.accounts.insert(account_id.clone());
        state.access_keys.insert((account_id, public_key), nonce);
    }

    #[must_use]
    pub fn with_account(self, account_id: AccountId, public_key: PublicKey, nonce: Nonce) -> Self {
        self.add_account(account_id, public_key, nonce);
        self
    }

    /// The next `errors.len()` submissions fail with these errors, in order,
    /// before the node looks at the payload.
    pub fn fail_next_sends(&self, errors: impl IntoIterator<Item = RpcError>) {
        self.state.lock().scripted_failures.extend(errors);
    }

    /// Calls to `method_name` fail during execution, rolling back the whole
    /// transaction they are part of.
    pub fn fail_calls_to(&self, method_name: &str) {
        self.state
            .lock()
            .failing_methods
            .insert(method_name.to_owned());
    }

    pub fn clear_call_failures(&self) {
        self.state.lock().failing_methods.clear();
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    #[must_use]
    pub fn accepted(&self) -> Vec<SignedPayload> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|tx| tx.accepted)
            .map(|tx| tx.payload.clone())
            .collect()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn calls_to(&self, method_name: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method_name == method_name)
            .collect()
    }

    #[must_use]
    pub fn block_hash_requests(&self) -> u64 {
        self.state.lock().height
    }

    #[must_use]
    pub fn has_account(&self, account_id: &AccountId) -> bool {
        self.state.lock().accounts.contains(account_id)
    }

    #[must_use]
    pub fn has_contract(&self, account_id: &AccountId) -> bool {
        self.state.lock().contracts.contains_key(account_id)
    }

    #[must_use]
    pub fn access_key(&self, account_id: &AccountId, public_key: &PublicKey) -> Option<Nonce> {
        self.state
            .lock()
            .access_keys
            .get(&(account_id.clone(), *public_key))
            .copied()
    }
}

impl MockState {
    fn execute(&mut self, payload: &SignedPayload) -> Result<Value, RpcError> {
        let body = payload.body();
        if !self.issued_hashes.contains(&body.block_hash) {
            return Err(RpcError::Expired(format!(
                "block hash {} was never issued",
                body.block_hash
            )));
        }
        if !body.public_key.verify(&payload.hash().0, payload.signature()) {
            return Err(RpcError::InvalidTransaction("InvalidSignature".to_owned()));
        }

        let key = (body.signer_id.clone(), body.public_key);
        let Some(current) = self.access_keys.get(&key).copied() else {
            return Err(RpcError::InvalidTransaction(format!(
                "InvalidAccessKeyError: no key {} on {}",
                body.public_key, body.signer_id
            )));
        };
        if body.nonce <= current {
            return Err(RpcError::StaleNonce(format!(
                "InvalidNonce {{ tx_nonce: {}, ak_nonce: {current} }}",
                body.nonce
            )));
        }
        self.access_keys.insert(key, body.nonce);

        let checkpoint = (
            self.accounts.clone(),
            self.contracts.clone(),
            self.access_keys.clone(),
            self.calls.len(),
        );
        if let Err(err) = self.apply_actions(payload) {
            let (accounts, contracts, access_keys, calls) = checkpoint;
            self.accounts = accounts;
            self.contracts = contracts;
            self.access_keys = access_keys;
            self.calls.truncate(calls);
            return Err(err);
        }

        Ok(json!({
            "status": {"SuccessValue": ""},
            "transaction": {
                "hash": payload.hash(),
                "signer_id": body.signer_id,
                "receiver_id": body.receiver_id,
                "nonce": body.nonce,
            },
        }))
    }

    /// Actions of one transaction take effect together or not at all.
    fn apply_actions(&mut self, payload: &SignedPayload) -> Result<(), RpcError> {
        let body = payload.body();
        let receiver = &body.receiver_id;
        for action in &body.actions {
            match action {
                Action::CreateAccount => {
                    if !self.accounts.insert(receiver.clone()) {
                        return Err(RpcError::ExecutionFailed(format!(
                            "AccountAlreadyExists {receiver}"
                        )));
                    }
                }
                Action::DeployContract(deploy) => {
                    self.contracts
                        .insert(receiver.clone(), CryptoHash::hash_bytes(&deploy.code));
                }
                Action::FunctionCall(call) => {
                    if !self.contracts.contains_key(receiver) {
                        return Err(RpcError::ExecutionFailed(format!(
                            "CodeDoesNotExist {receiver}"
                        )));
                    }
                    if self.failing_methods.contains(&call.method_name) {
                        return Err(RpcError::ExecutionFailed(format!(
                            "FunctionCallError: {receiver}.{} panicked",
                            call.method_name
                        )));
                    }
                    self.calls.push(RecordedCall {
                        signer_id: body.signer_id.clone(),
                        receiver_id: receiver.clone(),
                        method_name: call.method_name.clone(),
                        args: call.args_json().unwrap_or(Value::Null),
                    });
                }
                Action::Transfer { .. } => {}
                Action::AddKey { public_key, .. } => {
                    self.access_keys.insert(
                        (receiver.clone(), *public_key),
                        self.height * ACCESS_KEY_NONCE_RANGE_MULTIPLIER,
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn recent_block_hash(&self) -> Result<CryptoHash, RpcError> {
        let mut state = self.state.lock();
        state.height += 1;
        let hash = CryptoHash::hash_bytes(&state.height.to_le_bytes());
        state.issued_hashes.insert(hash);
        Ok(hash)
    }

    async fn access_key_nonce(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> Result<Nonce, RpcError> {
        self.access_key(account_id, public_key).ok_or_else(|| {
            RpcError::UnknownAccount(format!("access key {public_key} on {account_id}"))
        })
    }

    async fn view_account(&self, account_id: &AccountId) -> Result<Option<AccountView>, RpcError> {
        let state = self.state.lock();
        if !state.accounts.contains(account_id) {
            return Ok(None);
        }
        let code_hash = state.contracts.get(account_id).copied().unwrap_or_default();
        Ok(Some(AccountView { code_hash }))
    }

    async fn send_transaction(&self, payload: &SignedPayload) -> Result<Receipt, RpcError> {
        let mut state = self.state.lock();
        let outcome = match state.scripted_failures.pop_front() {
            Some(err) => Err(err),
            None => state.execute(payload),
        };
        state.sent.push(SentTransaction {
            payload: payload.clone(),
            accepted: outcome.is_ok(),
        });
        outcome.map(|outcome| Receipt {
            transaction_hash: payload.hash(),
            outcome,
        })
    }
}
