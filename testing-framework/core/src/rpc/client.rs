use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{AccountView, NodeRpc, Receipt, RpcError, classify_error, receipt_from_outcome};
use crate::{
    accounts::{AccountId, Nonce, PublicKey},
    transaction::{CryptoHash, SignedPayload},
};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);

/// JSON-RPC client for a single node endpoint.
pub struct JsonRpcClient {
    url: Url,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Every request carries `timeout`; expiry surfaces as [`RpcError::Timeout`].
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            client,
            next_id: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Issues one JSON-RPC request and returns its `result` member.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "method": method,
            "params": params,
        });

        debug!(method, id, "rpc request");
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if is_transient_status(status) {
            warn!(method, %status, "node responded with transient http status");
            return Err(if status == StatusCode::REQUEST_TIMEOUT {
                RpcError::Timeout(format!("{method}: http {status}"))
            } else {
                RpcError::Unavailable(format!("{method}: http {status}"))
            });
        }

        let body: Value = response.json().await.map_err(|err| {
            if err.is_timeout() {
                RpcError::Timeout(err.to_string())
            } else {
                RpcError::MalformedResponse(format!("{method}: http {status}: {err}"))
            }
        })?;

        if let Some(error) = body.get("error") {
            return Err(classify_error(error));
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::MalformedResponse(format!("{method}: missing result")))?;

        // Some query handlers report failures inside an otherwise successful result.
        if let Some(error) = result.get("error") {
            return Err(classify_error(&json!({ "message": error })));
        }
        Ok(result)
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn map_transport(err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::Timeout(err.to_string())
    } else {
        RpcError::Transport(err)
    }
}

fn field<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, RpcError> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .ok_or_else(|| RpcError::MalformedResponse(format!("missing field {}", path.join("."))))
}

#[async_trait]
impl NodeRpc for JsonRpcClient {
    async fn recent_block_hash(&self) -> Result<CryptoHash, RpcError> {
        let block = self.call("block", json!({"finality": "final"})).await?;
        let hash = field(&block, &["header", "hash"])?
            .as_str()
            .ok_or_else(|| RpcError::MalformedResponse("block hash is not a string".to_owned()))?;
        hash.parse::<CryptoHash>()
            .map_err(|err| RpcError::MalformedResponse(format!("{err}")))
    }

    async fn access_key_nonce(
        &self,
        account_id: &AccountId,
        public_key: &PublicKey,
    ) -> Result<Nonce, RpcError> {
        let key = self
            .call(
                "query",
                json!({
                    "request_type": "view_access_key",
                    "finality": "final",
                    "account_id": account_id,
                    "public_key": public_key,
                }),
            )
            .await?;
        field(&key, &["nonce"])?
            .as_u64()
            .ok_or_else(|| RpcError::MalformedResponse("access key nonce is not a u64".to_owned()))
    }

    async fn view_account(&self, account_id: &AccountId) -> Result<Option<AccountView>, RpcError> {
        let view = self
            .call(
                "query",
                json!({
                    "request_type": "view_account",
                    "finality": "final",
                    "account_id": account_id,
                }),
            )
            .await;
        let view = match view {
            Ok(view) => view,
            Err(RpcError::UnknownAccount(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let code_hash = field(&view, &["code_hash"])?
            .as_str()
            .ok_or_else(|| RpcError::MalformedResponse("code hash is not a string".to_owned()))?
            .parse::<CryptoHash>()
            .map_err(|err| RpcError::MalformedResponse(format!("{err}")))?;
        Ok(Some(AccountView { code_hash }))
    }

    async fn send_transaction(&self, payload: &SignedPayload) -> Result<Receipt, RpcError> {
        let outcome = self
            .call("broadcast_tx_commit", json!([payload.to_base64()]))
            .await?;
        receipt_from_outcome(payload.hash(), outcome)
    }
}
