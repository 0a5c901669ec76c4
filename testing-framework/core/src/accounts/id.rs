use std::{fmt, io, str::FromStr};

use borsh::BorshSerialize;
use parking_lot::Mutex;
use rand::{Rng as _, SeedableRng as _, rngs::StdRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_ACCOUNT_ID_LEN: usize = 2;
const MAX_ACCOUNT_ID_LEN: usize = 64;
const RANDOM_PREFIX_LEN: usize = 6;
const RANDOM_PREFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("account id '{id}' must be 2..=64 characters (got {len})")]
    Length { id: String, len: usize },
    #[error("account id '{id}' contains invalid character {ch:?} at position {pos}")]
    InvalidChar { id: String, ch: char, pos: usize },
    #[error("account id '{id}' has a leading, trailing or repeated separator")]
    Separator { id: String },
}

/// Validated on-chain account identifier.
///
/// Follows the network's naming rules: lowercase alphanumeric runs joined by
/// single `-`, `_` or `.` separators.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Result<Self, AccountIdError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// Builds `<prefix>.<self>`.
    pub fn sub_account(&self, prefix: &str) -> Result<Self, AccountIdError> {
        Self::new(format!("{prefix}.{}", self.0))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(id: &str) -> Result<(), AccountIdError> {
    let len = id.len();
    if !(MIN_ACCOUNT_ID_LEN..=MAX_ACCOUNT_ID_LEN).contains(&len) {
        return Err(AccountIdError::Length {
            id: id.to_owned(),
            len,
        });
    }

    let mut after_separator = true;
    for (pos, ch) in id.chars().enumerate() {
        match ch {
            'a'..='z' | '0'..='9' => after_separator = false,
            '-' | '_' | '.' => {
                if after_separator {
                    return Err(AccountIdError::Separator { id: id.to_owned() });
                }
                after_separator = true;
            }
            _ => {
                return Err(AccountIdError::InvalidChar {
                    id: id.to_owned(),
                    ch,
                    pos,
                });
            }
        }
    }

    if after_separator {
        return Err(AccountIdError::Separator { id: id.to_owned() });
    }
    Ok(())
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl BorshSerialize for AccountId {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.0, writer)
    }
}

/// Produces sub-account ids with a random leading component so that
/// generated accounts spread across the state trie instead of clustering
/// under one prefix.
pub struct AccountIdGenerator {
    rng: Mutex<StdRng>,
}

impl AccountIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, used by tests.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns `<random-prefix><suffix>.<parent>`.
    pub fn random_account_id(
        &self,
        parent: &AccountId,
        suffix: &str,
    ) -> Result<AccountId, AccountIdError> {
        let prefix: String = {
            let mut rng = self.rng.lock();
            (0..RANDOM_PREFIX_LEN)
                .map(|_| {
                    let idx = rng.gen_range(0..RANDOM_PREFIX_ALPHABET.len());
                    char::from(RANDOM_PREFIX_ALPHABET[idx])
                })
                .collect()
        };
        parent.sub_account(&format!("{prefix}{suffix}"))
    }
}

impl Default for AccountIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
