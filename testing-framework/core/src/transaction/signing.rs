use std::{fmt, io, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use borsh::BorshSerialize;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use super::Action;
use crate::accounts::{AccountId, InMemorySigner, Nonce, PublicKey, Signature};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to encode transaction: {0}")]
    Encode(#[from] io::Error),
    #[error("transaction for '{expected}' cannot be signed by '{actual}'")]
    SignerMismatch {
        expected: AccountId,
        actual: AccountId,
    },
}

/// SHA-256 digest, rendered in base58 like block and transaction hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshSerialize)]
pub struct CryptoHash(pub [u8; 32]);

impl CryptoHash {
    #[must_use]
    pub fn hash_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Error)]
#[error("invalid crypto hash '{0}'")]
pub struct InvalidHash(String);

impl FromStr for CryptoHash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bs58::decode(s)
            .into_vec()
            .ok()
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Self)
            .ok_or_else(|| InvalidHash(s.to_owned()))
    }
}

impl Serialize for CryptoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CryptoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// The unsigned transaction as the node hashes it.
#[derive(Clone, Debug, BorshSerialize)]
pub struct TransactionBody {
    pub signer_id: AccountId,
    pub public_key: PublicKey,
    pub nonce: Nonce,
    pub receiver_id: AccountId,
    pub block_hash: CryptoHash,
    pub actions: Vec<Action>,
}

/// Signed, encoded transaction ready for submission.
#[derive(Clone, Debug)]
pub struct SignedPayload {
    body: TransactionBody,
    signature: Signature,
    hash: CryptoHash,
    bytes: Vec<u8>,
}

impl SignedPayload {
    #[must_use]
    pub const fn body(&self) -> &TransactionBody {
        &self.body
    }

    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub const fn hash(&self) -> CryptoHash {
        self.hash
    }

    #[must_use]
    pub const fn nonce(&self) -> Nonce {
        self.body.nonce
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Encodes, hashes and signs a transaction.
pub fn sign_and_serialize(
    signer: &InMemorySigner,
    nonce: Nonce,
    receiver_id: AccountId,
    block_hash: CryptoHash,
    actions: Vec<Action>,
) -> Result<SignedPayload, SigningError> {
    let body = TransactionBody {
        signer_id: signer.account_id().clone(),
        public_key: signer.public_key(),
        nonce,
        receiver_id,
        block_hash,
        actions,
    };

    let mut bytes = borsh::to_vec(&body)?;
    let hash = CryptoHash::hash_bytes(&bytes);
    let signature = signer.sign(&hash.0);
    signature.serialize(&mut bytes)?;

    Ok(SignedPayload {
        body,
        signature,
        hash,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{FunctionCallAction, TGAS};

    fn signer(id: &str) -> InMemorySigner {
        InMemorySigner::from_seed(AccountId::new(id).unwrap(), id)
    }

    #[test]
    fn payload_is_signed_over_body_hash() {
        let signer = signer("alice.near");
        let receiver = AccountId::new("ft.near").unwrap();
        let call = FunctionCallAction::json(
            "ft_transfer",
            &serde_json::json!({"receiver_id": "bob.near", "amount": "1"}),
            300 * TGAS,
            1,
        );

        let payload = sign_and_serialize(
            &signer,
            7,
            receiver,
            CryptoHash::hash_bytes(b"block"),
            vec![Action::FunctionCall(call)],
        )
        .unwrap();

        let body_bytes = borsh::to_vec(payload.body()).unwrap();
        assert_eq!(payload.hash(), CryptoHash::hash_bytes(&body_bytes));
        assert!(
            signer
                .public_key()
                .verify(&payload.hash().0, payload.signature())
        );
        assert_eq!(payload.bytes().len(), body_bytes.len() + 65);
        assert_eq!(&payload.bytes()[..body_bytes.len()], body_bytes.as_slice());
    }

    #[test]
    fn body_layout_starts_with_signer_and_key() {
        let signer = signer("ab");
        let payload = sign_and_serialize(
            &signer,
            1,
            AccountId::new("cd").unwrap(),
            CryptoHash::default(),
            vec![Action::CreateAccount],
        )
        .unwrap();

        let bytes = payload.bytes();
        assert_eq!(&bytes[..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..6], b"ab");
        assert_eq!(bytes[6], 0);
        assert_eq!(&bytes[7..39], signer.public_key().as_bytes());
        assert_eq!(&bytes[39..47], &1u64.to_le_bytes());
    }

    #[test]
    fn hash_text_form_round_trips() {
        let hash = CryptoHash::hash_bytes(b"abc");
        let parsed: CryptoHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("not-base58!".parse::<CryptoHash>().is_err());
    }
}
