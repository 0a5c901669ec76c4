//! Social graph workload against a SocialDB contract.
//!
//! SocialDB stores arbitrary nested JSON under the sender's account. Next to
//! the data, a `set` call carries an `index` object whose values are JSON
//! *strings*, each encoding a list of `{"key", "value"}` objects. Indexers
//! consume those lists, so they must round trip exactly.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use loadgen_core::{
    Account, AccountId, NodeProxy, SharedAccount, WorkloadRegistry,
    scenario::{DynError, TaskFuture, TaskTable, UserId, VirtualUser},
    submission::SubmissionError,
    transaction::{Balance, FunctionCall, FunctionCallAction, Gas, NEAR_BASE, TGAS},
};
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use super::{deploy_code, ft::storage_deposit, user::NearUser};
use crate::context::SharedContext;

pub const SOCIAL_STORAGE_DEPOSIT: Balance = NEAR_BASE;
const SET_GAS: Gas = 300 * TGAS;
const INIT_GAS: Gas = 100 * TGAS;

#[derive(Debug, Error)]
pub enum SocialIndexError {
    #[error("index '{index_key}' must be an object of key/value pairs")]
    NotAnObject { index_key: String },
    #[error("index entry list is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub value: Value,
}

impl IndexEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("key".to_owned(), Value::String(self.key.clone()));
        object.insert("value".to_owned(), self.value.clone());
        Value::Object(object)
    }
}

/// Index key (`graph`, `notify`, ...) to the entries published under it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocialIndex {
    entries: BTreeMap<String, Vec<IndexEntry>>,
}

impl SocialIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index_key: impl Into<String>, entry: IndexEntry) {
        self.entries.entry(index_key.into()).or_default().push(entry);
    }

    /// Unfolds the lean form `{"graph": {"follow": {...}}}`: every
    /// member of an index key's object becomes one entry.
    pub fn from_object(object: &Map<String, Value>) -> Result<Self, SocialIndexError> {
        let mut index = Self::new();
        for (index_key, pairs) in object {
            let Value::Object(pairs) = pairs else {
                return Err(SocialIndexError::NotAnObject {
                    index_key: index_key.clone(),
                });
            };
            for (key, value) in pairs {
                index.push(index_key.clone(), IndexEntry::new(key.clone(), value.clone()));
            }
        }
        Ok(index)
    }
}

/// Encodes every entry list of `index` as a JSON string.
#[must_use]
pub fn build_index_obj(index: &SocialIndex) -> Map<String, Value> {
    index
        .entries
        .iter()
        .map(|(index_key, entries)| {
            let list = entries.iter().map(IndexEntry::to_value).collect();
            (index_key.clone(), Value::String(Value::Array(list).to_string()))
        })
        .collect()
}

/// Decodes one encoded entry list produced by [`build_index_obj`].
pub fn parse_index_entry(encoded: &str) -> Result<Vec<IndexEntry>, SocialIndexError> {
    Ok(serde_json::from_str(encoded)?)
}

/// Argument of SocialDB `set`: `{"data": {sender: {...values, "index": {...}}}}`.
#[must_use]
pub fn social_db_set_msg(sender: &AccountId, values: Map<String, Value>, index: &SocialIndex) -> Value {
    let mut updates = values;
    updates.insert("index".to_owned(), Value::Object(build_index_obj(index)));
    let mut data = Map::new();
    data.insert(sender.to_string(), Value::Object(updates));
    json!({ "data": data })
}

/// `sender` follows every account in `follow_list`.
#[must_use]
pub fn follow(social: &AccountId, sender: &AccountId, follow_list: &[AccountId]) -> FunctionCall {
    let mut followed = Map::new();
    let mut index = SocialIndex::new();
    for user in follow_list {
        followed.insert(user.to_string(), Value::String(String::new()));
        index.push(
            "graph",
            IndexEntry::new("follow", json!({ "type": "follow", "accountId": user })),
        );
        index.push(
            "notify",
            IndexEntry::new(user.as_str(), json!({ "type": "follow" })),
        );
    }

    let mut values = Map::new();
    values.insert("graph".to_owned(), json!({ "follow": followed }));
    let msg = social_db_set_msg(sender, values, &index);
    FunctionCall::new(
        sender.clone(),
        social.clone(),
        FunctionCallAction::json("set", &msg, SET_GAS, 0),
    )
}

/// `new` followed by `set_status {"status": "Live"}` in one transaction.
#[must_use]
pub fn init_social_db(contract: &AccountId) -> FunctionCall {
    FunctionCall::batch(
        contract.clone(),
        contract.clone(),
        vec![
            FunctionCallAction::raw("new", Vec::new(), INIT_GAS, 0),
            FunctionCallAction::json("set_status", &json!({ "status": "Live" }), INIT_GAS, 0),
        ],
        "init_social_db",
    )
}

pub struct SocialContract {
    account: SharedAccount,
    registry: WorkloadRegistry,
}

impl SocialContract {
    #[must_use]
    pub fn new(account: Account) -> Self {
        Self {
            account: SharedAccount::new(account),
            registry: WorkloadRegistry::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &AccountId {
        self.account.id()
    }

    #[must_use]
    pub const fn registry(&self) -> &WorkloadRegistry {
        &self.registry
    }

    pub async fn install(&self, node: &NodeProxy, code: Arc<[u8]>) -> Result<(), SubmissionError> {
        deploy_code(node, &self.account, code, &[init_social_db(self.id())]).await?;
        Ok(())
    }

    pub async fn register_user(
        &self,
        node: &NodeProxy,
        user: &mut Account,
    ) -> Result<(), SubmissionError> {
        let user_id = user.id().clone();
        node.send_tx(
            &storage_deposit(&user_id, self.id(), &user_id, SOCIAL_STORAGE_DEPOSIT),
            user,
        )
        .await?;
        self.registry.register(user_id);
        Ok(())
    }

    #[must_use]
    pub fn random_followee(&self, exclude: &AccountId) -> AccountId {
        self.registry
            .random_peer(&mut thread_rng(), exclude, self.id())
    }
}

pub struct SocialDbUser {
    user: NearUser,
}

impl SocialDbUser {
    async fn follow(&mut self) -> Result<(), DynError> {
        let ctx = Arc::clone(self.user.ctx());
        let social = ctx.require_social()?;
        let followee = social.random_followee(self.user.account_id());
        let tx = follow(social.id(), self.user.account_id(), &[followee]);
        self.user.send_tx(&tx).await?;
        Ok(())
    }
}

fn follow_task(user: &mut SocialDbUser) -> TaskFuture<'_> {
    Box::pin(user.follow())
}

#[async_trait]
impl VirtualUser for SocialDbUser {
    type Context = SharedContext;

    fn kind() -> &'static str {
        "social"
    }

    async fn on_start(id: UserId, ctx: Arc<SharedContext>) -> Result<Self, DynError> {
        let social = ctx.require_social()?;
        let mut user = NearUser::register(id, Arc::clone(&ctx)).await?;
        social.register_user(ctx.node(), user.account_mut()).await?;
        debug!(user = id, account = %user.account_id(), "social user ready");
        Ok(Self { user })
    }

    fn tasks() -> TaskTable<Self> {
        TaskTable::new().with("follow", 1, follow_task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> AccountId {
        AccountId::new(value).unwrap()
    }

    #[test]
    fn index_round_trips_through_encoded_string() {
        let object = json!({
            "graph": { "follow": { "type": "follow", "accountId": "bob.near" } }
        });
        let index = SocialIndex::from_object(object.as_object().unwrap()).unwrap();

        let encoded = build_index_obj(&index);
        let Value::String(graph) = &encoded["graph"] else {
            panic!("index values must be strings, got {}", encoded["graph"]);
        };

        assert_eq!(
            parse_index_entry(graph).unwrap(),
            vec![IndexEntry::new(
                "follow",
                json!({ "type": "follow", "accountId": "bob.near" })
            )]
        );
    }

    #[test]
    fn entries_with_many_keys_compare_regardless_of_key_order() {
        let decoded =
            parse_index_entry(r#"[{"value":{"accountId":"bob.near","type":"follow"},"key":"follow"}]"#)
                .unwrap();
        assert_eq!(
            decoded,
            vec![IndexEntry::new(
                "follow",
                json!({ "type": "follow", "accountId": "bob.near" })
            )]
        );
    }

    #[test]
    fn index_values_must_be_objects() {
        let object = json!({ "graph": "follow" });
        assert!(matches!(
            SocialIndex::from_object(object.as_object().unwrap()),
            Err(SocialIndexError::NotAnObject { index_key }) if index_key == "graph"
        ));
    }

    #[test]
    fn follow_builds_data_and_double_encoded_index() {
        let tx = follow(&id("social.near"), &id("alice.near"), &[id("bob.near")]);
        let call = &tx.calls()[0];
        assert_eq!(call.method_name, "set");
        assert_eq!(call.gas, 300 * TGAS);

        let msg = call.args_json().unwrap();
        let alice = &msg["data"]["alice.near"];
        assert_eq!(alice["graph"]["follow"]["bob.near"], json!(""));

        let graph = parse_index_entry(alice["index"]["graph"].as_str().unwrap()).unwrap();
        assert_eq!(
            graph,
            vec![IndexEntry::new(
                "follow",
                json!({ "type": "follow", "accountId": "bob.near" })
            )]
        );
        let notify = parse_index_entry(alice["index"]["notify"].as_str().unwrap()).unwrap();
        assert_eq!(
            notify,
            vec![IndexEntry::new("bob.near", json!({ "type": "follow" }))]
        );
    }

    #[test]
    fn init_batches_new_and_set_status() {
        let tx = init_social_db(&id("social.funding.test"));
        let calls = tx.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method_name, "new");
        assert!(calls[0].args.is_empty());
        assert_eq!(calls[1].method_name, "set_status");
        assert_eq!(calls[1].args_json().unwrap(), json!({ "status": "Live" }));
        assert!(calls.iter().all(|call| call.gas == 100 * TGAS));
    }
}
