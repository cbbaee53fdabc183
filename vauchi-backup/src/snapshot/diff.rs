// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Diffs and Atoms
//!
//! A [`SyncDiff`] records one field on which two snapshots of the same
//! identity disagree. A [`SyncAtom`] is the unit a device sends to its
//! siblings to converge one such setting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::Domain;
use crate::model::{GroupDetails, IdentityDetails, IdentityId};

/// What differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    OwnedPrivateIdentity,
    OwnedPublishedDetails,
    OwnedActive,
    KeycloakBinding,
    KeycloakServerUrl,
    KeycloakClientId,
    KeycloakClientSecret,
    KeycloakJwks,
    KeycloakSignatureKey,
    KeycloakUserId,
    KeycloakTransferRestricted,
    ContactMissing,
    ContactTrustedDetails,
    ContactPublishedDetails,
    ContactOneToOne,
    ContactTrustOrigins,
    GroupV1Missing,
    GroupV1PublishedDetails,
    GroupV1TrustedDetails,
    GroupV1Members,
    GroupV1PendingMembers,
    GroupV2Missing,
    GroupV2Version,
    GroupV2TrustedDetails,
    GroupV2PublishedDetails,
    GroupV2OwnPermissions,
    GroupV2Members,
    GroupV2PendingMembers,
    GroupV2KeycloakManaged,
    ProfileMissing,
    OpaqueContent,
}

/// Which entity a diff is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum DiffTarget {
    /// Produced by a node diffed on its own, outside any parent.
    Detached,
    OwnedIdentity,
    Profile(IdentityId),
    Contact(IdentityId),
    GroupV1(String),
    GroupV2(String),
    Delegate(String),
}

/// One detected discrepancy, carrying both sides' values.
///
/// `Value::Null` is a known-null value; a field unknown on either side never
/// produces a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDiff {
    pub kind: DiffKind,
    pub target: DiffTarget,
    pub local: Value,
    pub remote: Value,
}

impl SyncDiff {
    pub fn new(kind: DiffKind, target: DiffTarget, local: Value, remote: Value) -> Self {
        SyncDiff {
            kind,
            target,
            local,
            remote,
        }
    }

    /// Attaches a target to a diff produced by a detached child node.
    pub fn scoped(mut self, target: &DiffTarget) -> Self {
        if self.target == DiffTarget::Detached {
            self.target = target.clone();
        }
        self
    }

    /// Converts the diff into the atom that would make this device adopt
    /// the remote side, when the setting is one devices reconcile.
    pub fn to_atom(&self) -> Option<SyncAtom> {
        match (&self.kind, &self.target) {
            (DiffKind::ContactTrustedDetails, DiffTarget::Contact(contact)) => {
                let remote: IdentityDetails = serde_json::from_value(self.remote.clone()).ok()?;
                let local: Option<IdentityDetails> =
                    serde_json::from_value(self.local.clone()).ok();
                if local.is_some_and(|l| l.version >= remote.version) {
                    return None;
                }
                Some(SyncAtom::TrustContactDetails {
                    contact: contact.clone(),
                    version: remote.version,
                })
            }
            (DiffKind::ContactOneToOne, DiffTarget::Contact(contact)) => {
                Some(SyncAtom::ContactOneToOne {
                    contact: contact.clone(),
                    one_to_one: self.remote.as_bool()?,
                })
            }
            (DiffKind::GroupV1TrustedDetails, DiffTarget::GroupV1(group)) => {
                let remote: GroupDetails = serde_json::from_value(self.remote.clone()).ok()?;
                Some(SyncAtom::TrustGroupV1Details {
                    group: group.clone(),
                    version: remote.version,
                })
            }
            (DiffKind::GroupV2TrustedDetails, DiffTarget::GroupV2(group)) => {
                let remote: GroupDetails = serde_json::from_value(self.remote.clone()).ok()?;
                let local: Option<GroupDetails> = serde_json::from_value(self.local.clone()).ok();
                if local.is_some_and(|l| l.version >= remote.version) {
                    return None;
                }
                Some(SyncAtom::TrustGroupV2Details {
                    group: group.clone(),
                    version: remote.version,
                })
            }
            (DiffKind::KeycloakBinding, DiffTarget::OwnedIdentity | DiffTarget::Profile(_)) => {
                // Only a binding the remote side dropped converges automatically.
                (self.local == Value::Bool(true) && self.remote == Value::Bool(false))
                    .then_some(SyncAtom::KeycloakUnbind)
            }
            _ => None,
        }
    }
}

/// Kinds of [`SyncAtom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAtomKind {
    TrustContactDetails,
    ContactOneToOne,
    TrustGroupV1Details,
    TrustGroupV2Details,
    KeycloakUnbind,
}

/// One setting change propagated between devices of the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncAtom {
    /// Trust the contact's published details of the given version.
    TrustContactDetails { contact: IdentityId, version: u32 },
    ContactOneToOne { contact: IdentityId, one_to_one: bool },
    TrustGroupV1Details { group: String, version: u32 },
    TrustGroupV2Details { group: String, version: u32 },
    /// Drop the identity provider binding of the owned identity.
    KeycloakUnbind,
}

impl SyncAtom {
    pub fn kind(&self) -> SyncAtomKind {
        match self {
            SyncAtom::TrustContactDetails { .. } => SyncAtomKind::TrustContactDetails,
            SyncAtom::ContactOneToOne { .. } => SyncAtomKind::ContactOneToOne,
            SyncAtom::TrustGroupV1Details { .. } => SyncAtomKind::TrustGroupV1Details,
            SyncAtom::TrustGroupV2Details { .. } => SyncAtomKind::TrustGroupV2Details,
            SyncAtom::KeycloakUnbind => SyncAtomKind::KeycloakUnbind,
        }
    }
}

/// Collects leaf diffs over the intersection of two domains.
pub(crate) struct DiffBuilder {
    common: Domain,
    target: DiffTarget,
    diffs: Vec<SyncDiff>,
}

impl DiffBuilder {
    pub(crate) fn new(local: &Domain, remote: &Domain, target: DiffTarget) -> Self {
        DiffBuilder {
            common: local.intersection(remote),
            target,
            diffs: Vec::new(),
        }
    }

    /// True when both sides captured `field`.
    pub(crate) fn comparable(&self, field: &str) -> bool {
        self.common.contains(field)
    }

    pub(crate) fn field<T: PartialEq + Serialize>(
        &mut self,
        field: &str,
        kind: DiffKind,
        local: &T,
        remote: &T,
    ) {
        if self.comparable(field) && local != remote {
            self.push(kind, to_value(local), to_value(remote));
        }
    }

    pub(crate) fn push(&mut self, kind: DiffKind, local: Value, remote: Value) {
        self.diffs
            .push(SyncDiff::new(kind, self.target.clone(), local, remote));
    }

    pub(crate) fn extend(&mut self, diffs: impl IntoIterator<Item = SyncDiff>) {
        self.diffs.extend(diffs);
    }

    pub(crate) fn finish(self) -> Vec<SyncDiff> {
        self.diffs
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
