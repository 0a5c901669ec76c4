use std::sync::Arc;

use super::{AccessKey, Action, Balance, DeployContractAction, FunctionCallAction, Transaction};
use crate::accounts::{AccountId, PublicKey};

/// Creates `new_account_id`, funds it and installs a full access key.
#[derive(Clone, Debug)]
pub struct CreateSubAccount {
    pub signer_id: AccountId,
    pub new_account_id: AccountId,
    pub public_key: PublicKey,
    pub balance: Balance,
}

impl Transaction for CreateSubAccount {
    fn label(&self) -> &str {
        "create_account"
    }

    fn signer_id(&self) -> &AccountId {
        &self.signer_id
    }

    fn receiver_id(&self) -> &AccountId {
        &self.new_account_id
    }

    fn actions(&self) -> Vec<Action> {
        vec![
            Action::CreateAccount,
            Action::Transfer {
                deposit: self.balance,
            },
            Action::AddKey {
                public_key: self.public_key,
                access_key: AccessKey::default(),
            },
        ]
    }
}

/// Installs contract code on the signer's own account, followed by `init`
/// calls in the same transaction. The code only lands if every call succeeds.
#[derive(Clone, Debug)]
pub struct DeployContract {
    pub account_id: AccountId,
    pub code: Arc<[u8]>,
    pub init: Vec<FunctionCallAction>,
}

impl Transaction for DeployContract {
    fn label(&self) -> &str {
        "deploy_contract"
    }

    fn signer_id(&self) -> &AccountId {
        &self.account_id
    }

    fn receiver_id(&self) -> &AccountId {
        &self.account_id
    }

    fn actions(&self) -> Vec<Action> {
        let deploy = Action::DeployContract(DeployContractAction {
            code: Arc::clone(&self.code),
        });
        std::iter::once(deploy)
            .chain(self.init.iter().cloned().map(Action::FunctionCall))
            .collect()
    }
}

/// One or more contract calls executed atomically in a single transaction.
#[derive(Clone, Debug)]
pub struct FunctionCall {
    signer_id: AccountId,
    receiver_id: AccountId,
    calls: Vec<FunctionCallAction>,
    label: String,
}

impl FunctionCall {
    #[must_use]
    pub fn new(signer_id: AccountId, receiver_id: AccountId, call: FunctionCallAction) -> Self {
        let label = call.method_name.clone();
        Self {
            signer_id,
            receiver_id,
            calls: vec![call],
            label,
        }
    }

    #[must_use]
    pub fn batch(
        signer_id: AccountId,
        receiver_id: AccountId,
        calls: Vec<FunctionCallAction>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            signer_id,
            receiver_id,
            calls,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn calls(&self) -> &[FunctionCallAction] {
        &self.calls
    }
}

impl Transaction for FunctionCall {
    fn label(&self) -> &str {
        &self.label
    }

    fn signer_id(&self) -> &AccountId {
        &self.signer_id
    }

    fn receiver_id(&self) -> &AccountId {
        &self.receiver_id
    }

    fn actions(&self) -> Vec<Action> {
        self.calls.iter().cloned().map(Action::FunctionCall).collect()
    }
}

#[derive(Clone, Debug)]
pub struct Transfer {
    pub signer_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Balance,
}

impl Transaction for Transfer {
    fn label(&self) -> &str {
        "transfer"
    }

    fn signer_id(&self) -> &AccountId {
        &self.signer_id
    }

    fn receiver_id(&self) -> &AccountId {
        &self.receiver_id
    }

    fn actions(&self) -> Vec<Action> {
        vec![Action::Transfer {
            deposit: self.amount,
        }]
    }
}
