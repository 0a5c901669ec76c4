use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use borsh::BorshSerialize;
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::{Rng as _, thread_rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use super::id::{AccountId, AccountIdError};

const ED25519_PREFIX: &str = "ed25519";
const ED25519_KEY_TYPE: u8 = 0;
const SEED_LEN: usize = 32;
const PUBLIC_KEY_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;
const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unsupported key type '{0}' (only ed25519 is supported)")]
    UnsupportedKeyType(String),
    #[error("invalid base58 key data: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("invalid key length {len}, expected {expected}")]
    Length { len: usize, expected: usize },
    #[error("secret key does not match its embedded public key")]
    InvalidKeypair,
    #[error("key file for '{account_id}' declares a public key that does not match its secret key")]
    PublicKeyMismatch { account_id: AccountId },
    #[error("failed to read key file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse key file {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    AccountId(#[from] AccountIdError),
}

fn split_key_type(value: &str) -> Result<&str, KeyError> {
    match value.split_once(':') {
        Some((ED25519_PREFIX, data)) => Ok(data),
        Some((other, _)) => Err(KeyError::UnsupportedKeyType(other.to_owned())),
        None => Ok(value),
    }
}

fn decode_exact<const N: usize>(data: &str) -> Result<[u8; N], KeyError> {
    let bytes = bs58::decode(data).into_vec()?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| KeyError::Length { len, expected: N })
}

/// Ed25519 public key, rendered as `ed25519:<base58>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Checks `signature` over `message` against this key.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &signature).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ED25519_PREFIX}:{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_exact::<PUBLIC_KEY_LEN>(split_key_type(s)?).map(Self)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl BorshSerialize for PublicKey {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[ED25519_KEY_TYPE])?;
        writer.write_all(&self.0)
    }
}

/// Ed25519 signature over a transaction hash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ED25519_PREFIX}:{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl BorshSerialize for Signature {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[ED25519_KEY_TYPE])?;
        writer.write_all(&self.0)
    }
}

/// Ed25519 secret key. Text form is `ed25519:<base58(seed || public)>`.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    #[must_use]
    pub fn from_random() -> Self {
        let seed: [u8; SEED_LEN] = thread_rng().r#gen();
        Self(SigningKey::from_bytes(&seed))
    }

    /// Derives a key from a human-readable seed. Only suitable for test
    /// networks: anyone knowing the seed can recompute the key.
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        let mut bytes = [b' '; SEED_LEN];
        let len = seed.len().min(SEED_LEN);
        bytes[..len].copy_from_slice(&seed.as_bytes()[..len]);
        Self(SigningKey::from_bytes(&bytes))
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message).to_bytes())
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ED25519_PREFIX}:{}",
            bs58::encode(self.0.to_keypair_bytes()).into_string()
        )
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({})", self.public_key())
    }
}

impl FromStr for SecretKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(split_key_type(s)?).into_vec()?;
        match bytes.len() {
            KEYPAIR_LEN => {
                let mut keypair = [0u8; KEYPAIR_LEN];
                keypair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&keypair)
                    .map(Self)
                    .map_err(|_| KeyError::InvalidKeypair)
            }
            SEED_LEN => {
                let mut seed = [0u8; SEED_LEN];
                seed.copy_from_slice(&bytes);
                Ok(Self(SigningKey::from_bytes(&seed)))
            }
            len => Err(KeyError::Length {
                len,
                expected: KEYPAIR_LEN,
            }),
        }
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// On-disk credentials, as written by node tooling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub account_id: AccountId,
    pub public_key: PublicKey,
    #[serde(alias = "private_key")]
    pub secret_key: SecretKey,
}

impl KeyFile {
    pub fn from_file(path: &Path) -> Result<Self, KeyError> {
        let content = fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| KeyError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), KeyError> {
        let content = serde_json::to_string_pretty(self).map_err(|source| KeyError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// An account id bound to the key that signs on its behalf.
#[derive(Clone, Debug)]
pub struct InMemorySigner {
    account_id: AccountId,
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl InMemorySigner {
    #[must_use]
    pub fn from_secret_key(account_id: AccountId, secret_key: SecretKey) -> Self {
        Self {
            account_id,
            public_key: secret_key.public_key(),
            secret_key,
        }
    }

    #[must_use]
    pub fn from_random(account_id: AccountId) -> Self {
        Self::from_secret_key(account_id, SecretKey::from_random())
    }

    #[must_use]
    pub fn from_seed(account_id: AccountId, seed: &str) -> Self {
        Self::from_secret_key(account_id, SecretKey::from_seed(seed))
    }

    pub fn from_file(path: &Path) -> Result<Self, KeyError> {
        let file = KeyFile::from_file(path)?;
        let signer = Self::from_secret_key(file.account_id, file.secret_key);
        if signer.public_key != file.public_key {
            return Err(KeyError::PublicKeyMismatch {
                account_id: signer.account_id,
            });
        }
        Ok(signer)
    }

    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret_key.sign(message)
    }

    #[must_use]
    pub fn to_key_file(&self) -> KeyFile {
        KeyFile {
            account_id: self.account_id.clone(),
            public_key: self.public_key,
            secret_key: self.secret_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    #[test]
    fn secret_key_text_form_round_trips() {
        let key = SecretKey::from_random();
        let text = key.to_string();
        assert!(text.starts_with("ed25519:"));

        let parsed: SecretKey = text.parse().unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let a = SecretKey::from_seed("sweat.funding.test");
        let b = SecretKey::from_seed("sweat.funding.test");
        let c = SecretKey::from_seed("other.funding.test");
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn rejects_foreign_key_types() {
        let err = "secp256k1:abc".parse::<PublicKey>().unwrap_err();
        assert!(matches!(err, KeyError::UnsupportedKeyType(kind) if kind == "secp256k1"));
    }

    #[test]
    fn signatures_verify_against_public_key() {
        let signer = InMemorySigner::from_random(account("alice.near"));
        let signature = signer.sign(b"payload");
        assert!(signer.public_key().verify(b"payload", &signature));
        assert!(!signer.public_key().verify(b"tampered", &signature));
    }

    #[test]
    fn key_file_round_trips_and_accepts_private_key_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        let signer = InMemorySigner::from_random(account("funding.test"));
        signer.to_key_file().write_to_file(&path).unwrap();

        let loaded = InMemorySigner::from_file(&path).unwrap();
        assert_eq!(loaded.account_id(), signer.account_id());
        assert_eq!(loaded.public_key(), signer.public_key());

        let legacy = serde_json::json!({
            "account_id": "funding.test",
            "public_key": signer.public_key().to_string(),
            "private_key": signer.to_key_file().secret_key.to_string(),
        });
        let legacy_path = dir.path().join("legacy.json");
        fs::write(&legacy_path, legacy.to_string()).unwrap();
        assert!(InMemorySigner::from_file(&legacy_path).is_ok());
    }

    #[test]
    fn key_file_with_foreign_public_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        let mut file = InMemorySigner::from_random(account("funding.test")).to_key_file();
        file.public_key = SecretKey::from_random().public_key();
        file.write_to_file(&path).unwrap();

        assert!(matches!(
            InMemorySigner::from_file(&path),
            Err(KeyError::PublicKeyMismatch { .. })
        ));
    }
}
