// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identity subsystem contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::RestoreToken;
use crate::model::{Contact, GroupV1, GroupV2, IdentityId, OwnedIdentity, RestoredProfile};
use crate::snapshot::{SnapshotError, SyncAtom};

/// What the identity delegate needs from the identity subsystem.
pub trait IdentityStore: Send + Sync {
    fn owned_identities(&self) -> Vec<OwnedIdentity>;

    fn owned_identity(&self, id: &IdentityId) -> Option<OwnedIdentity>;

    fn contacts(&self, owned: &IdentityId) -> Vec<Contact>;

    fn groups_v1(&self, owned: &IdentityId) -> Vec<GroupV1>;

    fn groups_v2(&self, owned: &IdentityId) -> Vec<GroupV2>;

    /// Stages a restored profile. The profile is visible immediately but
    /// disappears again if the token is rolled back.
    fn stage_profile(
        &self,
        profile: RestoredProfile,
    ) -> Result<Box<dyn RestoreToken>, SnapshotError>;

    /// Applies one reconciliation atom to `owned`. Returns whether anything
    /// changed.
    fn apply_sync_atom(&self, owned: &IdentityId, atom: &SyncAtom) -> Result<bool, SnapshotError>;
}

#[derive(Debug, Clone)]
struct Profile {
    identity: OwnedIdentity,
    contacts: BTreeMap<IdentityId, Contact>,
    groups_v1: BTreeMap<String, GroupV1>,
    groups_v2: BTreeMap<String, GroupV2>,
    staged: bool,
}

impl Profile {
    fn new(identity: OwnedIdentity) -> Self {
        Profile {
            identity,
            contacts: BTreeMap::new(),
            groups_v1: BTreeMap::new(),
            groups_v2: BTreeMap::new(),
            staged: false,
        }
    }
}

type Profiles = Arc<RwLock<BTreeMap<IdentityId, Profile>>>;

/// Reference identity subsystem keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    profiles: Profiles,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an owned identity, keeping its graph.
    pub fn upsert_identity(&self, identity: OwnedIdentity) {
        let mut profiles = self.profiles.write();
        match profiles.get_mut(&identity.id) {
            Some(profile) => profile.identity = identity,
            None => {
                profiles.insert(identity.id.clone(), Profile::new(identity));
            }
        }
    }

    pub fn remove_identity(&self, id: &IdentityId) -> bool {
        self.profiles.write().remove(id).is_some()
    }

    pub fn upsert_contact(&self, contact: Contact) -> Result<(), SnapshotError> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(&contact.owned_identity)
            .ok_or_else(|| SnapshotError::IdentityNotFound(contact.owned_identity.to_hex()))?;
        profile.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }

    pub fn upsert_group_v1(&self, group: GroupV1) -> Result<(), SnapshotError> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(&group.owned_identity)
            .ok_or_else(|| SnapshotError::IdentityNotFound(group.owned_identity.to_hex()))?;
        profile.groups_v1.insert(group.key(), group);
        Ok(())
    }

    pub fn upsert_group_v2(&self, group: GroupV2) -> Result<(), SnapshotError> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(&group.owned_identity)
            .ok_or_else(|| SnapshotError::IdentityNotFound(group.owned_identity.to_hex()))?;
        profile.groups_v2.insert(group.key(), group);
        Ok(())
    }

    pub fn contact(&self, owned: &IdentityId, contact: &IdentityId) -> Option<Contact> {
        self.profiles
            .read()
            .get(owned)
            .and_then(|p| p.contacts.get(contact).cloned())
    }

    /// True while a restored profile awaits commit.
    pub fn is_staged(&self, id: &IdentityId) -> bool {
        self.profiles.read().get(id).is_some_and(|p| p.staged)
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn owned_identities(&self) -> Vec<OwnedIdentity> {
        self.profiles
            .read()
            .values()
            .map(|p| p.identity.clone())
            .collect()
    }

    fn owned_identity(&self, id: &IdentityId) -> Option<OwnedIdentity> {
        self.profiles.read().get(id).map(|p| p.identity.clone())
    }

    fn contacts(&self, owned: &IdentityId) -> Vec<Contact> {
        self.profiles
            .read()
            .get(owned)
            .map(|p| p.contacts.values().cloned().collect())
            .unwrap_or_default()
    }

    fn groups_v1(&self, owned: &IdentityId) -> Vec<GroupV1> {
        self.profiles
            .read()
            .get(owned)
            .map(|p| p.groups_v1.values().cloned().collect())
            .unwrap_or_default()
    }

    fn groups_v2(&self, owned: &IdentityId) -> Vec<GroupV2> {
        self.profiles
            .read()
            .get(owned)
            .map(|p| p.groups_v2.values().cloned().collect())
            .unwrap_or_default()
    }

    fn stage_profile(
        &self,
        restored: RestoredProfile,
    ) -> Result<Box<dyn RestoreToken>, SnapshotError> {
        let id = restored.identity.id.clone();
        let mut profiles = self.profiles.write();
        if profiles.contains_key(&id) {
            return Err(SnapshotError::IdentityExists(id.to_hex()));
        }

        let mut profile = Profile::new(restored.identity);
        profile.staged = true;
        profile.contacts = restored
            .contacts
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        profile.groups_v1 = restored
            .groups_v1
            .into_iter()
            .map(|g| (g.key(), g))
            .collect();
        profile.groups_v2 = restored
            .groups_v2
            .into_iter()
            .map(|g| (g.key(), g))
            .collect();
        profiles.insert(id.clone(), profile);

        Ok(Box::new(StagedProfile {
            profiles: Arc::clone(&self.profiles),
            id,
        }))
    }

    fn apply_sync_atom(&self, owned: &IdentityId, atom: &SyncAtom) -> Result<bool, SnapshotError> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(owned)
            .ok_or_else(|| SnapshotError::IdentityNotFound(owned.to_hex()))?;

        let changed = match atom {
            SyncAtom::TrustContactDetails { contact, version } => {
                match profile.contacts.get_mut(contact) {
                    Some(c)
                        if c.published_details.as_ref().is_some_and(|p| p.version == *version) =>
                    {
                        if let Some(published) = c.published_details.take() {
                            c.trusted_details = published;
                        }
                        true
                    }
                    _ => false,
                }
            }
            SyncAtom::ContactOneToOne {
                contact,
                one_to_one,
            } => match profile.contacts.get_mut(contact) {
                Some(c) if c.one_to_one != *one_to_one => {
                    c.one_to_one = *one_to_one;
                    true
                }
                _ => false,
            },
            SyncAtom::TrustGroupV1Details { group, version } => {
                // Pending owner details sit in `trusted_details` until accepted.
                match profile.groups_v1.get_mut(group) {
                    Some(g)
                        if g.trusted_details.as_ref().is_some_and(|t| t.version == *version) =>
                    {
                        if let Some(details) = g.trusted_details.take() {
                            g.published_details = details;
                        }
                        true
                    }
                    _ => false,
                }
            }
            SyncAtom::TrustGroupV2Details { group, version } => {
                match profile.groups_v2.get_mut(group) {
                    Some(g)
                        if g.published_details.as_ref().is_some_and(|p| p.version == *version) =>
                    {
                        if let Some(published) = g.published_details.take() {
                            g.trusted_details = published;
                        }
                        true
                    }
                    _ => false,
                }
            }
            SyncAtom::KeycloakUnbind => profile.identity.keycloak.take().is_some(),
        };
        Ok(changed)
    }
}

struct StagedProfile {
    profiles: Profiles,
    id: IdentityId,
}

impl RestoreToken for StagedProfile {
    fn commit(self: Box<Self>) {
        if let Some(profile) = self.profiles.write().get_mut(&self.id) {
            profile.staged = false;
        }
    }

    fn rollback(self: Box<Self>) {
        let mut profiles = self.profiles.write();
        if profiles.get(&self.id).is_some_and(|p| p.staged) {
            profiles.remove(&self.id);
        }
    }
}
