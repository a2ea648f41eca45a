//! Owner sets for partner administration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tessera_types::Identity;

/// Identities allowed to administer one partner record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSet {
    owners: BTreeSet<Identity>,
}

impl OwnerSet {
    /// Create an owner set holding a single owner.
    pub fn with_owner(owner: Identity) -> Self {
        let mut set = Self::default();
        set.insert(owner);
        set
    }

    /// Grant ownership. Returns `false` if `owner` was already present.
    pub fn insert(&mut self, owner: Identity) -> bool {
        self.owners.insert(owner)
    }

    /// Revoke ownership. Returns `false` if `owner` was not present.
    pub fn remove(&mut self, owner: &Identity) -> bool {
        self.owners.remove(owner)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.owners.contains(identity)
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Owners in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.owners.iter()
    }
}
