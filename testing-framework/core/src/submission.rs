use std::{num::NonZeroU32, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{
    accounts::{Account, SharedAccount},
    adjust_timeout,
    rpc::{NodeRpc, Receipt, RpcError},
    transaction::Transaction,
};

const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(5) {
    Some(value) => value,
    None => NonZeroU32::MIN,
};
const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(4);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounds how long a single transaction may keep its sender busy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    /// Delay after the first failed attempt; doubles on each further failure.
    pub backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for one fetch-sign-send round trip.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            attempt_timeout: adjust_timeout(DEFAULT_ATTEMPT_TIMEOUT),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{label} rejected on attempt {attempts}: {source}")]
    Permanent {
        label: String,
        attempts: u32,
        #[source]
        source: RpcError,
    },
    #[error("{label} still failing after {attempts} attempts: {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: RpcError,
    },
}

impl SubmissionError {
    /// The failure observed on the final attempt.
    #[must_use]
    pub const fn last_error(&self) -> &RpcError {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// True when every attempt failed for reasons outside the transaction.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Drives fetch-hash, reserve-nonce, sign and send, retrying transient
/// failures with a freshly signed payload each time.
#[derive(Clone)]
pub struct Submitter {
    rpc: Arc<dyn NodeRpc>,
    policy: RetryPolicy,
}

impl Submitter {
    #[must_use]
    pub fn new(rpc: Arc<dyn NodeRpc>, policy: RetryPolicy) -> Self {
        Self { rpc, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submits `tx` from `account`. A nonce consumed by a failed attempt is
    /// never reused.
    pub async fn submit(
        &self,
        tx: &dyn Transaction,
        account: &mut Account,
    ) -> Result<Receipt, SubmissionError> {
        let label = tx.label();
        let max_attempts = self.policy.max_attempts.get();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = timeout(self.policy.attempt_timeout, self.attempt(tx, account))
                .await
                .unwrap_or_else(|_| {
                    Err(RpcError::Timeout(format!(
                        "{label} attempt exceeded {:?}",
                        self.policy.attempt_timeout
                    )))
                });

            match outcome {
                Ok(receipt) => {
                    debug!(
                        label,
                        account = %account.id(),
                        attempt,
                        tx_hash = %receipt.transaction_hash,
                        "transaction committed"
                    );
                    return Ok(receipt);
                }
                Err(source) if !source.is_transient() => {
                    warn!(label, account = %account.id(), attempt, error = %source, "transaction rejected");
                    return Err(SubmissionError::Permanent {
                        label: label.to_owned(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) if attempt >= max_attempts => {
                    warn!(label, account = %account.id(), attempt, error = %source, "giving up on transaction");
                    return Err(SubmissionError::Exhausted {
                        label: label.to_owned(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) => {
                    let delay = self.policy.backoff_after(attempt);
                    debug!(
                        label,
                        account = %account.id(),
                        attempt,
                        ?delay,
                        error = %source,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Locks the shared sender for the whole submission, retries included.
    pub async fn submit_shared(
        &self,
        tx: &dyn Transaction,
        account: &SharedAccount,
    ) -> Result<Receipt, SubmissionError> {
        let mut account = account.lock().await;
        self.submit(tx, &mut account).await
    }

    async fn attempt(
        &self,
        tx: &dyn Transaction,
        account: &mut Account,
    ) -> Result<Receipt, RpcError> {
        let block_hash = self.rpc.recent_block_hash().await?;
        let nonce = account.next_nonce();
        let payload = tx.build_signed_payload(account.signer(), nonce, block_hash)?;
        debug!(label = tx.label(), account = %account.id(), nonce, "sending transaction");
        self.rpc.send_transaction(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        accounts::{AccountId, InMemorySigner, Nonce, PublicKey},
        rpc::{AccountView, mock::MockNode},
        transaction::{CryptoHash, SignedPayload, Transfer},
    };

    /// Hands out block hashes but never answers a submission.
    #[derive(Default)]
    struct SilentNode {
        sends: AtomicU32,
    }

    #[async_trait]
    impl NodeRpc for SilentNode {
        async fn recent_block_hash(&self) -> Result<CryptoHash, RpcError> {
            Ok(CryptoHash::default())
        }

        async fn access_key_nonce(
            &self,
            _account_id: &AccountId,
            _public_key: &PublicKey,
        ) -> Result<Nonce, RpcError> {
            Ok(0)
        }

        async fn view_account(
            &self,
            _account_id: &AccountId,
        ) -> Result<Option<AccountView>, RpcError> {
            Ok(None)
        }

        async fn send_transaction(&self, _payload: &SignedPayload) -> Result<Receipt, RpcError> {
            self.sends.fetch_add(1, Ordering::Relaxed);
            std::future::pending().await
        }
    }

    fn setup(nonce: u64) -> (Arc<MockNode>, Submitter, Account) {
        let signer = InMemorySigner::from_random(AccountId::new("alice.test").unwrap());
        let node = Arc::new(MockNode::new().with_account(
            signer.account_id().clone(),
            signer.public_key(),
            nonce,
        ));
        let submitter = Submitter::new(node.clone(), RetryPolicy::default());
        (node, submitter, Account::new(signer, nonce))
    }

    fn transfer() -> Transfer {
        Transfer {
            signer_id: AccountId::new("alice.test").unwrap(),
            receiver_id: AccountId::new("bob.test").unwrap(),
            amount: 1,
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(5), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(40), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_fresh_nonce_and_hash() {
        let (node, submitter, mut account) = setup(10);
        node.fail_next_sends([
            RpcError::Unavailable("busy".to_owned()),
            RpcError::Timeout("slow".to_owned()),
        ]);

        let receipt = submitter.submit(&transfer(), &mut account).await.unwrap();

        assert_eq!(account.nonce(), 13);
        let sent = node.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(receipt.transaction_hash, sent[2].payload.hash());
        for pair in sent.windows(2) {
            assert!(pair[0].payload.nonce() < pair[1].payload.nonce());
            assert_ne!(
                pair[0].payload.body().block_hash,
                pair[1].payload.body().block_hash
            );
        }
        assert_eq!(node.block_hash_requests(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let (node, submitter, mut account) = setup(0);
        node.fail_next_sends([RpcError::ExecutionFailed("panicked".to_owned())]);

        let err = submitter.submit(&transfer(), &mut account).await.unwrap_err();

        assert!(matches!(err, SubmissionError::Permanent { attempts: 1, .. }));
        assert_eq!(node.sent().len(), 1);
        assert_eq!(account.nonce(), 1);

        submitter.submit(&transfer(), &mut account).await.unwrap();
        assert_eq!(node.accepted()[0].nonce(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let (node, submitter, mut account) = setup(0);
        node.fail_next_sends((0..10).map(|_| RpcError::Unavailable("down".to_owned())));

        let err = submitter.submit(&transfer(), &mut account).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.attempts(), 5);
        assert!(matches!(err.last_error(), RpcError::Unavailable(_)));
        assert_eq!(account.nonce(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_node_times_out_into_bounded_retries() {
        let node = Arc::new(SilentNode::default());
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let submitter = Submitter::new(node.clone(), policy);
        let signer = InMemorySigner::from_random(AccountId::new("alice.test").unwrap());
        let mut account = Account::new(signer, 0);

        let err = submitter.submit(&transfer(), &mut account).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.attempts(), 5);
        assert!(matches!(err.last_error(), RpcError::Timeout(_)));
        assert_eq!(account.nonce(), 5);
        assert_eq!(node.sends.load(Ordering::Relaxed), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_local_nonce_recovers_through_stale_nonce_retries() {
        let (node, submitter, mut account) = setup(3);
        let mut behind = Account::new(account.signer().clone(), 1);

        let receipt = submitter.submit(&transfer(), &mut behind).await.unwrap();

        assert_eq!(behind.nonce(), 4);
        assert_eq!(node.sent().len(), 3);
        assert!(node.accepted().iter().all(|p| p.hash() == receipt.transaction_hash));
        assert_eq!(account.refresh_nonce(node.as_ref()).await.unwrap(), 4);
    }
}
