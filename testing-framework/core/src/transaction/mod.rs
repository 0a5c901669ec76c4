mod kinds;
mod signing;

use std::{fmt, io, sync::Arc};

use borsh::BorshSerialize;
pub use kinds::{CreateSubAccount, DeployContract, FunctionCall, Transfer};
use serde_json::Value;
pub use signing::{CryptoHash, SignedPayload, SigningError, TransactionBody, sign_and_serialize};

use crate::accounts::{AccountId, InMemorySigner, Nonce, PublicKey};

pub type Balance = u128;
pub type Gas = u64;

/// 10^12 gas units.
pub const TGAS: Gas = 1_000_000_000_000;
/// Yocto units in one NEAR.
pub const NEAR_BASE: Balance = 1_000_000_000_000_000_000_000_000;

#[must_use]
pub const fn near(amount: u64) -> Balance {
    amount as Balance * NEAR_BASE
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    CreateAccount,
    DeployContract(DeployContractAction),
    FunctionCall(FunctionCallAction),
    Transfer { deposit: Balance },
    AddKey { public_key: PublicKey, access_key: AccessKey },
}

const CREATE_ACCOUNT_TAG: u8 = 0;
const DEPLOY_CONTRACT_TAG: u8 = 1;
const FUNCTION_CALL_TAG: u8 = 2;
const TRANSFER_TAG: u8 = 3;
const ADD_KEY_TAG: u8 = 5;
const FULL_ACCESS_TAG: u8 = 1;

impl BorshSerialize for Action {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Self::CreateAccount => CREATE_ACCOUNT_TAG.serialize(writer),
            Self::DeployContract(action) => {
                DEPLOY_CONTRACT_TAG.serialize(writer)?;
                action.code.as_ref().serialize(writer)
            }
            Self::FunctionCall(call) => {
                FUNCTION_CALL_TAG.serialize(writer)?;
                call.method_name.serialize(writer)?;
                call.args.serialize(writer)?;
                call.gas.serialize(writer)?;
                call.deposit.serialize(writer)
            }
            Self::Transfer { deposit } => {
                TRANSFER_TAG.serialize(writer)?;
                deposit.serialize(writer)
            }
            Self::AddKey {
                public_key,
                access_key,
            } => {
                ADD_KEY_TAG.serialize(writer)?;
                public_key.serialize(writer)?;
                access_key.nonce.serialize(writer)?;
                FULL_ACCESS_TAG.serialize(writer)
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DeployContractAction {
    pub code: Arc<[u8]>,
}

impl fmt::Debug for DeployContractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployContractAction")
            .field("code_len", &self.code.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallAction {
    pub method_name: String,
    pub args: Vec<u8>,
    pub gas: Gas,
    pub deposit: Balance,
}

impl FunctionCallAction {
    /// Call with JSON-encoded arguments.
    #[must_use]
    pub fn json(method_name: impl Into<String>, args: &Value, gas: Gas, deposit: Balance) -> Self {
        Self::raw(method_name, args.to_string().into_bytes(), gas, deposit)
    }

    #[must_use]
    pub fn raw(method_name: impl Into<String>, args: Vec<u8>, gas: Gas, deposit: Balance) -> Self {
        Self {
            method_name: method_name.into(),
            args,
            gas,
            deposit,
        }
    }

    /// Parses the arguments back as JSON, if they are JSON.
    #[must_use]
    pub fn args_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.args).ok()
    }
}

/// Access key granted by `AddKey`. Only full access keys are issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessKey {
    pub nonce: Nonce,
}

/// A unit of work submitted by exactly one sender.
///
/// Implementations are immutable descriptions; the nonce and block hash are
/// only supplied when the payload is signed.
pub trait Transaction: Send + Sync {
    /// Short name used in logs and errors.
    fn label(&self) -> &str;

    fn signer_id(&self) -> &AccountId;

    fn receiver_id(&self) -> &AccountId;

    fn actions(&self) -> Vec<Action>;

    fn build_signed_payload(
        &self,
        signer: &InMemorySigner,
        nonce: Nonce,
        block_hash: CryptoHash,
    ) -> Result<SignedPayload, SigningError> {
        if signer.account_id() != self.signer_id() {
            return Err(SigningError::SignerMismatch {
                expected: self.signer_id().clone(),
                actual: signer.account_id().clone(),
            });
        }
        sign_and_serialize(
            signer,
            nonce,
            self.receiver_id().clone(),
            block_hash,
            self.actions(),
        )
    }
}
