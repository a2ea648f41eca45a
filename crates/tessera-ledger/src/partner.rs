//! Partner directory.
//!
//! A partner record is created once per identity and never deleted. Every
//! mutation of an existing record is gated on the caller being in the
//! record's owner set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_types::views::PartnerSummary;
use tessera_types::Identity;

use crate::index::SubscriptionIndex;
use crate::owners::OwnerSet;
use crate::{LedgerError, Result};

/// A payee that members can allocate fee shares to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub payout_destination: Identity,
    pub display_name: String,
    pub owners: OwnerSet,
    pub index: SubscriptionIndex,
}

impl Partner {
    fn new(owner: Identity, payout_destination: Identity, display_name: String) -> Self {
        Self {
            payout_destination,
            display_name,
            owners: OwnerSet::with_owner(owner),
            index: SubscriptionIndex::default(),
        }
    }

    /// Read-only view of the record.
    pub fn summary(&self, partner: Identity) -> PartnerSummary {
        PartnerSummary {
            partner,
            payout_destination: self.payout_destination,
            display_name: self.display_name.clone(),
            owners: self.owners.iter().copied().collect(),
            pending_ticks: self.index.queue().to_vec(),
            pending_subscribers: self.index.pending_subscribers(),
        }
    }
}

/// Identity-keyed partner records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDirectory {
    partners: BTreeMap<Identity, Partner>,
}

impl PartnerDirectory {
    pub fn get(&self, partner: &Identity) -> Option<&Partner> {
        self.partners.get(partner)
    }

    pub fn contains(&self, partner: &Identity) -> bool {
        self.partners.contains_key(partner)
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Partner)> {
        self.partners.iter()
    }

    /// Whether `identity` owns `partner`. False for unknown partners.
    pub fn is_owner(&self, partner: &Identity, identity: &Identity) -> bool {
        self.partners
            .get(partner)
            .is_some_and(|p| p.owners.contains(identity))
    }

    /// Look up `partner` for mutation on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] if `caller` does not own
    ///   `partner`, including when no such partner exists
    pub fn authorize(&mut self, partner: &Identity, caller: &Identity) -> Result<&mut Partner> {
        match self.partners.get_mut(partner) {
            Some(record) if record.owners.contains(caller) => Ok(record),
            _ => Err(LedgerError::NotAuthorizedOwner),
        }
    }

    /// Look up `partner` for enrollment.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PartnerDoesNotExist`] if there is no such partner
    pub fn existing_mut(&mut self, partner: &Identity) -> Result<&mut Partner> {
        self.partners
            .get_mut(partner)
            .ok_or(LedgerError::PartnerDoesNotExist)
    }

    /// Create a partner record keyed and owned by `caller`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyPartner`] if `caller` already has a record
    pub fn register(
        &mut self,
        caller: Identity,
        payout_destination: Identity,
        display_name: &str,
    ) -> Result<&Partner> {
        if self.partners.contains_key(&caller) {
            return Err(LedgerError::AlreadyPartner);
        }
        let record = self
            .partners
            .entry(caller)
            .or_insert_with(|| Partner::new(caller, payout_destination, display_name.to_string()));
        Ok(record)
    }

    /// Overwrite payout destination and display name of `partner`.
    ///
    /// The record mutated is always the one the caller was authorized
    /// against, never the caller's own record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] if `caller` does not own `partner`
    pub fn update(
        &mut self,
        caller: &Identity,
        partner: &Identity,
        payout_destination: Identity,
        display_name: &str,
    ) -> Result<()> {
        let record = self.authorize(partner, caller)?;
        record.payout_destination = payout_destination;
        record.display_name = display_name.to_string();
        Ok(())
    }

    /// Grant `owner` ownership of `partner`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] if `caller` does not own `partner`
    pub fn add_owner(&mut self, caller: &Identity, partner: &Identity, owner: Identity) -> Result<()> {
        self.authorize(partner, caller)?.owners.insert(owner);
        Ok(())
    }

    /// Revoke `owner`'s ownership of `partner`.
    ///
    /// Returns `true` if the owner set is now empty. Removing the last owner
    /// is allowed and leaves the record permanently unadministrable.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthorizedOwner`] if `caller` does not own `partner`
    pub fn remove_owner(
        &mut self,
        caller: &Identity,
        partner: &Identity,
        owner: &Identity,
    ) -> Result<bool> {
        let record = self.authorize(partner, caller)?;
        record.owners.remove(owner);
        Ok(record.owners.is_empty())
    }
}
