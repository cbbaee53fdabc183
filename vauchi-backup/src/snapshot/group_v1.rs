// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! First-generation group snapshot (leaf node).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::{same_by_diff, Restore, SnapshotError, SnapshotNode};
use crate::model::{parse_group_v1_key, GroupDetails, GroupV1, IdentityId};

pub const PUBLISHED_DETAILS: &str = "published_details";
pub const TRUSTED_DETAILS: &str = "trusted_details";
pub const MEMBERS: &str = "members";
pub const PENDING_MEMBERS: &str = "pending_members";

const MANDATORY: &[&str] = &[PUBLISHED_DETAILS, MEMBERS];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupV1Snapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_details: Option<GroupDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_details: Option<GroupDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<BTreeSet<IdentityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_members: Option<BTreeSet<IdentityId>>,
}

impl GroupV1Snapshot {
    /// Captures a group; trusted details of the published version are left out.
    pub fn of(group: &GroupV1) -> Self {
        let trusted_details = group
            .trusted_details
            .as_ref()
            .filter(|trusted| trusted.version != group.published_details.version)
            .cloned();

        GroupV1Snapshot {
            domain: Domain::of(&[PUBLISHED_DETAILS, TRUSTED_DETAILS, MEMBERS, PENDING_MEMBERS]),
            published_details: Some(group.published_details.clone()),
            trusted_details,
            members: Some(group.members.clone()),
            pending_members: Some(group.pending_members.clone()),
        }
    }
}

impl SnapshotNode for GroupV1Snapshot {
    const NODE: &'static str = "group_v1";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        same_by_diff(self, other)
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        diff.field(
            PUBLISHED_DETAILS,
            DiffKind::GroupV1PublishedDetails,
            &self.published_details,
            &other.published_details,
        );
        diff.field(
            TRUSTED_DETAILS,
            DiffKind::GroupV1TrustedDetails,
            &self.trusted_details,
            &other.trusted_details,
        );
        diff.field(MEMBERS, DiffKind::GroupV1Members, &self.members, &other.members);
        diff.field(
            PENDING_MEMBERS,
            DiffKind::GroupV1PendingMembers,
            &self.pending_members,
            &other.pending_members,
        );
        diff.finish()
    }
}

/// Where a v1 group snapshot is being restored.
#[derive(Debug, Clone)]
pub struct GroupV1RestoreContext {
    pub owned_identity: IdentityId,
    /// Snapshot map key, `<owner hex>:<uid hex>`.
    pub key: String,
}

impl Restore for GroupV1Snapshot {
    type Context = GroupV1RestoreContext;
    type Entity = GroupV1;

    fn restore(&self, context: &GroupV1RestoreContext) -> Result<GroupV1, SnapshotError> {
        self.domain.require(Self::NODE, MANDATORY)?;
        let missing = |field: &'static str| SnapshotError::MissingMandatoryField {
            node: Self::NODE,
            field,
        };
        let (owner, uid) = parse_group_v1_key(&context.key)
            .ok_or_else(|| SnapshotError::InvalidKey(context.key.clone()))?;

        Ok(GroupV1 {
            owned_identity: context.owned_identity.clone(),
            owner,
            uid,
            published_details: self
                .published_details
                .clone()
                .ok_or_else(|| missing(PUBLISHED_DETAILS))?,
            trusted_details: self.trusted_details.clone(),
            members: self.members.clone().ok_or_else(|| missing(MEMBERS))?,
            pending_members: self.pending_members.clone().unwrap_or_default(),
        })
    }
}
