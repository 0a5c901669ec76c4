use serde_json::Value;

use super::{Receipt, RpcError};
use crate::transaction::CryptoHash;

const INVALID_NONCE: &str = "InvalidNonce";
const EXPIRED: &str = "Expired";

fn detail_of(error: &Value) -> String {
    error
        .get("data")
        .or_else(|| error.get("cause").and_then(|cause| cause.get("info")))
        .unwrap_or(error)
        .to_string()
}

/// Maps a JSON-RPC `error` object onto [`RpcError`].
///
/// Structured errors carry `cause.name`; older nodes only send a message,
/// which is searched for the well-known failure markers instead.
#[must_use]
pub fn classify_error(error: &Value) -> RpcError {
    let detail = detail_of(error);
    let cause = error
        .get("cause")
        .and_then(|cause| cause.get("name"))
        .and_then(Value::as_str);

    match cause {
        Some("TIMEOUT_ERROR") => RpcError::Timeout(detail),
        Some("INTERNAL_ERROR" | "NO_SYNCED_BLOCKS" | "NOT_SYNCED_YET" | "UNKNOWN_BLOCK") => {
            RpcError::Unavailable(detail)
        }
        Some("UNKNOWN_TRANSACTION") => RpcError::UnknownTransaction(detail),
        Some("INVALID_TRANSACTION") => classify_invalid_transaction(detail),
        Some("UNKNOWN_ACCOUNT" | "UNKNOWN_ACCESS_KEY") => RpcError::UnknownAccount(detail),
        Some(name) => RpcError::Handler {
            name: name.to_owned(),
            detail,
        },
        None => classify_legacy(error),
    }
}

fn classify_invalid_transaction(detail: String) -> RpcError {
    if detail.contains(INVALID_NONCE) {
        RpcError::StaleNonce(detail)
    } else if detail.contains(EXPIRED) {
        RpcError::Expired(detail)
    } else {
        RpcError::InvalidTransaction(detail)
    }
}

fn classify_legacy(error: &Value) -> RpcError {
    let text = error.to_string();
    if text.contains(INVALID_NONCE) {
        RpcError::StaleNonce(text)
    } else if text.contains(EXPIRED) {
        RpcError::Expired(text)
    } else if text.to_ascii_lowercase().contains("timeout") {
        RpcError::Timeout(text)
    } else if text.contains("does not exist") {
        RpcError::UnknownAccount(text)
    } else {
        RpcError::Handler {
            name: "UNKNOWN".to_owned(),
            detail: text,
        }
    }
}

/// Interprets the `result` of `broadcast_tx_commit`.
pub fn receipt_from_outcome(
    transaction_hash: CryptoHash,
    outcome: Value,
) -> Result<Receipt, RpcError> {
    let Some(status) = outcome.get("status") else {
        return Err(RpcError::MalformedResponse(format!(
            "outcome without status: {outcome}"
        )));
    };

    // Nonce rejections arrive as INVALID_TRANSACTION errors, never as an
    // execution status.
    if let Some(failure) = status.get("Failure") {
        return Err(RpcError::ExecutionFailed(failure.to_string()));
    }

    if status.get("SuccessValue").is_none() && status.get("SuccessReceiptId").is_none() {
        return Err(RpcError::MalformedResponse(format!(
            "unexpected status: {status}"
        )));
    }

    Ok(Receipt {
        transaction_hash,
        outcome,
    })
}
