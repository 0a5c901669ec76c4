//! Fixtures shared by the end-to-end scenarios.

use std::{fs, sync::Arc};

use loadgen_core::{
    Account, AccountId, InMemorySigner, Nonce, NodeProxy, RetryPolicy, rpc::mock::MockNode,
};
use loadgen_workflows::ContractPaths;
use tempfile::TempDir;

pub const FUNDING_ACCOUNT: &str = "funding.test";

/// Registers the funding account on `node` at `nonce`. The returned account
/// starts from nonce zero, as if freshly loaded from a key file.
#[must_use]
pub fn funding_on(node: &MockNode, nonce: Nonce) -> Account {
    let id = AccountId::new(FUNDING_ACCOUNT).expect("valid funding id");
    let signer = InMemorySigner::from_random(id);
    node.add_account(signer.account_id().clone(), signer.public_key(), nonce);
    Account::new(signer, 0)
}

#[must_use]
pub fn proxy(node: &Arc<MockNode>) -> NodeProxy {
    let rpc: Arc<MockNode> = Arc::clone(node);
    NodeProxy::new(rpc, RetryPolicy::default())
}

/// Writes placeholder contract binaries into a temporary directory.
#[must_use]
pub fn fake_contracts() -> (TempDir, ContractPaths) {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = ContractPaths {
        ft: dir.path().join("fungible_token.wasm"),
        social: dir.path().join("social_db.wasm"),
        sweat: dir.path().join("sweat.wasm"),
        depend: dir.path().join("depend.wasm"),
    };
    for (path, code) in [
        (&paths.ft, &b"ft"[..]),
        (&paths.social, b"social"),
        (&paths.sweat, b"sweat"),
        (&paths.depend, b"depend"),
    ] {
        fs::write(path, code).expect("write contract");
    }
    (dir, paths)
}
