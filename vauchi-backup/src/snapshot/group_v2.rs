// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Second-generation group snapshot (leaf node).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::{same_by_diff, Restore, SnapshotError, SnapshotNode};
use crate::model::{GroupDetails, GroupPermission, GroupV2, IdentityId};

pub const VERSION: &str = "version";
pub const TRUSTED_DETAILS: &str = "trusted_details";
pub const PUBLISHED_DETAILS: &str = "published_details";
pub const OWN_PERMISSIONS: &str = "own_permissions";
pub const MEMBERS: &str = "members";
pub const PENDING_MEMBERS: &str = "pending_members";
pub const KEYCLOAK_MANAGED: &str = "keycloak_managed";

const MANDATORY: &[&str] = &[VERSION, TRUSTED_DETAILS, OWN_PERMISSIONS, MEMBERS];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupV2Snapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_details: Option<GroupDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_details: Option<GroupDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_permissions: Option<BTreeSet<GroupPermission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<BTreeMap<IdentityId, BTreeSet<GroupPermission>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_members: Option<BTreeSet<IdentityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_managed: Option<bool>,
}

impl GroupV2Snapshot {
    /// Captures a group; published details of the trusted version are left out.
    pub fn of(group: &GroupV2) -> Self {
        let published_details = group
            .published_details
            .as_ref()
            .filter(|published| published.version != group.trusted_details.version)
            .cloned();

        GroupV2Snapshot {
            domain: Domain::of(&[
                VERSION,
                TRUSTED_DETAILS,
                PUBLISHED_DETAILS,
                OWN_PERMISSIONS,
                MEMBERS,
                PENDING_MEMBERS,
                KEYCLOAK_MANAGED,
            ]),
            version: Some(group.version),
            trusted_details: Some(group.trusted_details.clone()),
            published_details,
            own_permissions: Some(group.own_permissions.clone()),
            members: Some(group.members.clone()),
            pending_members: Some(group.pending_members.clone()),
            keycloak_managed: Some(group.keycloak_managed),
        }
    }
}

impl SnapshotNode for GroupV2Snapshot {
    const NODE: &'static str = "group_v2";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        same_by_diff(self, other)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        diff.field(VERSION, DiffKind::GroupV2Version, &self.version, &other.version);
        diff.field(
            TRUSTED_DETAILS,
            DiffKind::GroupV2TrustedDetails,
            &self.trusted_details,
            &other.trusted_details,
        );
        diff.field(
            PUBLISHED_DETAILS,
            DiffKind::GroupV2PublishedDetails,
            &self.published_details,
            &other.published_details,
        );
        diff.field(
            OWN_PERMISSIONS,
            DiffKind::GroupV2OwnPermissions,
            &self.own_permissions,
            &other.own_permissions,
        );
        diff.field(MEMBERS, DiffKind::GroupV2Members, &self.members, &other.members);
        diff.field(
            PENDING_MEMBERS,
            DiffKind::GroupV2PendingMembers,
            &self.pending_members,
            &other.pending_members,
        );
        diff.field(
            KEYCLOAK_MANAGED,
            DiffKind::GroupV2KeycloakManaged,
            &self.keycloak_managed,
            &other.keycloak_managed,
        );
        diff.finish()
    }
}

/// Where a v2 group snapshot is being restored.
#[derive(Debug, Clone)]
pub struct GroupV2RestoreContext {
    pub owned_identity: IdentityId,
    /// Snapshot map key, the hex group identifier.
    pub key: String,
}

impl Restore for GroupV2Snapshot {
    type Context = GroupV2RestoreContext;
    type Entity = GroupV2;

    fn restore(&self, context: &GroupV2RestoreContext) -> Result<GroupV2, SnapshotError> {
        self.domain.require(Self::NODE, MANDATORY)?;
        let missing = |field: &'static str| SnapshotError::MissingMandatoryField {
            node: Self::NODE,
            field,
        };
        let id = hex::decode(&context.key)
            .map_err(|_| SnapshotError::InvalidKey(context.key.clone()))?;

        Ok(GroupV2 {
            owned_identity: context.owned_identity.clone(),
            id,
            version: self.version.ok_or_else(|| missing(VERSION))?,
            trusted_details: self
                .trusted_details
                .clone()
                .ok_or_else(|| missing(TRUSTED_DETAILS))?,
            published_details: self.published_details.clone(),
            own_permissions: self
                .own_permissions
                .clone()
                .ok_or_else(|| missing(OWN_PERMISSIONS))?,
            members: self.members.clone().ok_or_else(|| missing(MEMBERS))?,
            pending_members: self.pending_members.clone().unwrap_or_default(),
            keycloak_managed: self.keycloak_managed.unwrap_or(false),
        })
    }
}
