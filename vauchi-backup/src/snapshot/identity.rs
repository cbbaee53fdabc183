// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Owned Identity Snapshot
//!
//! Composite node holding an owned identity and, for full profile
//! snapshots, its contacts and groups. Child nodes are diffed on their own
//! and their diffs are attached to the entity they describe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contact::{ContactRestoreContext, ContactSnapshot};
use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::group_v1::{GroupV1RestoreContext, GroupV1Snapshot};
use super::group_v2::{GroupV2RestoreContext, GroupV2Snapshot};
use super::keycloak::KeycloakSnapshot;
use super::{Restore, SnapshotError, SnapshotNode};
use crate::model::{
    Contact, GroupV1, GroupV2, IdentityDetails, IdentityId, OwnedIdentity, PrivateIdentity,
    RestoredProfile,
};

pub const PRIVATE_IDENTITY: &str = "private_identity";
pub const PUBLISHED_DETAILS: &str = "published_details";
pub const ACTIVE: &str = "active";
pub const KEYCLOAK: &str = "keycloak";
pub const CONTACTS: &str = "contacts";
pub const GROUPS_V1: &str = "groups_v1";
pub const GROUPS_V2: &str = "groups_v2";

const MANDATORY: &[&str] = &[PRIVATE_IDENTITY, PUBLISHED_DETAILS];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_identity: Option<PrivateIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_details: Option<IdentityDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak: Option<KeycloakSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<BTreeMap<IdentityId, ContactSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_v1: Option<BTreeMap<String, GroupV1Snapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_v2: Option<BTreeMap<String, GroupV2Snapshot>>,
}

impl IdentitySnapshot {
    /// Full profile snapshot: the identity plus its social graph.
    pub fn of(
        owned: &OwnedIdentity,
        contacts: &[Contact],
        groups_v1: &[GroupV1],
        groups_v2: &[GroupV2],
    ) -> Self {
        let mut snapshot = Self::of_profile_only(owned);
        snapshot.domain.insert(CONTACTS);
        snapshot.domain.insert(GROUPS_V1);
        snapshot.domain.insert(GROUPS_V2);
        snapshot.contacts = Some(
            contacts
                .iter()
                .map(|contact| (contact.id.clone(), ContactSnapshot::of(contact)))
                .collect(),
        );
        snapshot.groups_v1 = Some(
            groups_v1
                .iter()
                .map(|group| (group.key(), GroupV1Snapshot::of(group)))
                .collect(),
        );
        snapshot.groups_v2 = Some(
            groups_v2
                .iter()
                .map(|group| (group.key(), GroupV2Snapshot::of(group)))
                .collect(),
        );
        snapshot
    }

    /// Identity only, as carried by device backups. Contacts and groups are
    /// left outside the domain.
    pub fn of_profile_only(owned: &OwnedIdentity) -> Self {
        IdentitySnapshot {
            domain: Domain::of(&[PRIVATE_IDENTITY, PUBLISHED_DETAILS, ACTIVE, KEYCLOAK]),
            private_identity: Some(owned.private_identity.clone()),
            published_details: Some(owned.published_details.clone()),
            active: Some(owned.active),
            keycloak: owned.keycloak.as_ref().map(KeycloakSnapshot::of),
            contacts: None,
            groups_v1: None,
            groups_v2: None,
        }
    }

    /// Whether this snapshot carries contacts and groups.
    pub fn is_full_profile(&self) -> bool {
        self.domain.contains(CONTACTS)
    }
}

impl SnapshotNode for IdentitySnapshot {
    const NODE: &'static str = "identity";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        if self.domain != other.domain || !self.compute_diff(other).is_empty() {
            return false;
        }
        let keycloak_same = match (&self.keycloak, &other.keycloak) {
            (Some(a), Some(b)) => a.are_contents_the_same(b),
            (None, None) => true,
            _ => false,
        };
        keycloak_same
            && children_same(&self.contacts, &other.contacts)
            && children_same(&self.groups_v1, &other.groups_v1)
            && children_same(&self.groups_v2, &other.groups_v2)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::OwnedIdentity);

        if diff.comparable(PRIVATE_IDENTITY) && self.private_identity != other.private_identity {
            // Secrets never leave the node; the server is enough to tell the
            // two sides apart.
            let server = |p: &Option<PrivateIdentity>| {
                p.as_ref()
                    .map_or(Value::Null, |p| Value::String(p.server.clone()))
            };
            diff.push(
                DiffKind::OwnedPrivateIdentity,
                server(&self.private_identity),
                server(&other.private_identity),
            );
        }
        diff.field(
            PUBLISHED_DETAILS,
            DiffKind::OwnedPublishedDetails,
            &self.published_details,
            &other.published_details,
        );
        diff.field(ACTIVE, DiffKind::OwnedActive, &self.active, &other.active);

        if diff.comparable(KEYCLOAK) {
            match (&self.keycloak, &other.keycloak) {
                (Some(local), Some(remote)) => {
                    let nested = local.compute_diff(remote);
                    diff.extend(nested.into_iter().map(|d| d.scoped(&DiffTarget::OwnedIdentity)));
                }
                (None, None) => {}
                (local, remote) => diff.push(
                    DiffKind::KeycloakBinding,
                    Value::Bool(local.is_some()),
                    Value::Bool(remote.is_some()),
                ),
            }
        }

        if diff.comparable(CONTACTS) {
            let nested = diff_children(
                &self.contacts,
                &other.contacts,
                DiffKind::ContactMissing,
                |id| DiffTarget::Contact(id.clone()),
            );
            diff.extend(nested);
        }
        if diff.comparable(GROUPS_V1) {
            let nested = diff_children(
                &self.groups_v1,
                &other.groups_v1,
                DiffKind::GroupV1Missing,
                |key| DiffTarget::GroupV1(key.clone()),
            );
            diff.extend(nested);
        }
        if diff.comparable(GROUPS_V2) {
            let nested = diff_children(
                &self.groups_v2,
                &other.groups_v2,
                DiffKind::GroupV2Missing,
                |key| DiffTarget::GroupV2(key.clone()),
            );
            diff.extend(nested);
        }

        diff.finish()
    }
}

/// Diffs two keyed child collections. Entries present on one side only
/// yield a `missing` diff whose values tell which side has it.
fn diff_children<K, N, F>(
    local: &Option<BTreeMap<K, N>>,
    remote: &Option<BTreeMap<K, N>>,
    missing: DiffKind,
    target: F,
) -> Vec<SyncDiff>
where
    K: Ord,
    N: SnapshotNode,
    F: Fn(&K) -> DiffTarget,
{
    let empty = BTreeMap::new();
    let local = local.as_ref().unwrap_or(&empty);
    let remote = remote.as_ref().unwrap_or(&empty);
    let mut diffs = Vec::new();

    for (key, local_node) in local {
        let scope = target(key);
        match remote.get(key) {
            Some(remote_node) => diffs.extend(
                local_node
                    .compute_diff(remote_node)
                    .into_iter()
                    .map(|d| d.scoped(&scope)),
            ),
            None => diffs.push(SyncDiff::new(
                missing,
                scope,
                Value::Bool(true),
                Value::Bool(false),
            )),
        }
    }
    for key in remote.keys().filter(|key| !local.contains_key(*key)) {
        diffs.push(SyncDiff::new(
            missing,
            target(key),
            Value::Bool(false),
            Value::Bool(true),
        ));
    }
    diffs
}

fn children_same<K: Ord, N: SnapshotNode>(
    local: &Option<BTreeMap<K, N>>,
    remote: &Option<BTreeMap<K, N>>,
) -> bool {
    match (local, remote) {
        (Some(a), Some(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, node)| {
                    b.get(key)
                        .is_some_and(|other| node.are_contents_the_same(other))
                })
        }
        (None, None) => true,
        _ => false,
    }
}

/// Where an identity snapshot is being restored.
#[derive(Debug, Clone)]
pub struct IdentityRestoreContext {
    pub owned_identity: IdentityId,
}

impl Restore for IdentitySnapshot {
    type Context = IdentityRestoreContext;
    type Entity = RestoredProfile;

    fn restore(&self, context: &IdentityRestoreContext) -> Result<RestoredProfile, SnapshotError> {
        self.domain.require(Self::NODE, MANDATORY)?;
        let missing = |field: &'static str| SnapshotError::MissingMandatoryField {
            node: Self::NODE,
            field,
        };
        let owned_identity = &context.owned_identity;

        let keycloak = match &self.keycloak {
            Some(snapshot) => Some(snapshot.restore(&())?),
            None => None,
        };
        let identity = OwnedIdentity {
            id: owned_identity.clone(),
            private_identity: self
                .private_identity
                .clone()
                .ok_or_else(|| missing(PRIVATE_IDENTITY))?,
            published_details: self
                .published_details
                .clone()
                .ok_or_else(|| missing(PUBLISHED_DETAILS))?,
            keycloak,
            active: self.active.unwrap_or(true),
        };

        let contacts = self
            .contacts
            .iter()
            .flatten()
            .map(|(id, snapshot)| {
                snapshot.restore(&ContactRestoreContext {
                    owned_identity: owned_identity.clone(),
                    contact: id.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let groups_v1 = self
            .groups_v1
            .iter()
            .flatten()
            .map(|(key, snapshot)| {
                snapshot.restore(&GroupV1RestoreContext {
                    owned_identity: owned_identity.clone(),
                    key: key.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let groups_v2 = self
            .groups_v2
            .iter()
            .flatten()
            .map(|(key, snapshot)| {
                snapshot.restore(&GroupV2RestoreContext {
                    owned_identity: owned_identity.clone(),
                    key: key.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RestoredProfile {
            identity,
            contacts,
            groups_v1,
            groups_v2,
        })
    }
}
