use parking_lot::RwLock;
use rand::{Rng, seq::IteratorRandom as _};

use crate::accounts::AccountId;

/// Accounts that completed registration with one contract.
///
/// Appends are visible to every later read; order carries no meaning.
#[derive(Default)]
pub struct WorkloadRegistry {
    members: RwLock<Vec<AccountId>>,
}

impl WorkloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, account_id: AccountId) {
        self.members.write().push(account_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// A random member other than `exclude`, or `fallback` when there is none.
    #[must_use]
    pub fn random_peer<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exclude: &AccountId,
        fallback: &AccountId,
    ) -> AccountId {
        self.members
            .read()
            .iter()
            .filter(|member| *member != exclude)
            .choose(rng)
            .unwrap_or(fallback)
            .clone()
    }

    /// Up to `count` distinct members other than `exclude`.
    #[must_use]
    pub fn random_peers<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exclude: &AccountId,
        count: usize,
    ) -> Vec<AccountId> {
        self.members
            .read()
            .iter()
            .filter(|member| *member != exclude)
            .cloned()
            .choose_multiple(rng, count)
    }
}
