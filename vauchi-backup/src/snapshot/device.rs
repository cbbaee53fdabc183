// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device snapshot: every owned identity on the device, profile only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diff::{DiffBuilder, DiffKind, DiffTarget, SyncDiff};
use super::domain::Domain;
use super::identity::{IdentityRestoreContext, IdentitySnapshot};
use super::{Restore, SnapshotError, SnapshotNode};
use crate::model::{IdentityId, OwnedIdentity, RestoredProfile};

pub const PROFILES: &str = "profiles";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<BTreeMap<IdentityId, IdentitySnapshot>>,
}

impl DeviceSnapshot {
    pub fn of(identities: &[OwnedIdentity]) -> Self {
        DeviceSnapshot {
            domain: Domain::of(&[PROFILES]),
            profiles: Some(
                identities
                    .iter()
                    .map(|owned| (owned.id.clone(), IdentitySnapshot::of_profile_only(owned)))
                    .collect(),
            ),
        }
    }

    pub fn profile_ids(&self) -> Vec<IdentityId> {
        self.profiles
            .iter()
            .flat_map(|profiles| profiles.keys().cloned())
            .collect()
    }
}

impl SnapshotNode for DeviceSnapshot {
    const NODE: &'static str = "device";

    fn domain(&self) -> &Domain {
        &self.domain
    }

    fn are_contents_the_same(&self, other: &Self) -> bool {
        if self.domain != other.domain {
            return false;
        }
        match (&self.profiles, &other.profiles) {
            (Some(a), Some(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(id, profile)| {
                        b.get(id)
                            .is_some_and(|other| profile.are_contents_the_same(other))
                    })
            }
            (None, None) => true,
            _ => false,
        }
    }

    fn compute_diff(&self, other: &Self) -> Vec<SyncDiff> {
        let mut diff = DiffBuilder::new(&self.domain, &other.domain, DiffTarget::Detached);
        if !diff.comparable(PROFILES) {
            return diff.finish();
        }

        let empty = BTreeMap::new();
        let local = self.profiles.as_ref().unwrap_or(&empty);
        let remote = other.profiles.as_ref().unwrap_or(&empty);

        for (id, profile) in local {
            let target = DiffTarget::Profile(id.clone());
            match remote.get(id) {
                Some(other_profile) => {
                    diff.extend(profile.compute_diff(other_profile).into_iter().map(|mut d| {
                        if d.target == DiffTarget::OwnedIdentity {
                            d.target = target.clone();
                        }
                        d
                    }))
                }
                None => diff.extend([SyncDiff::new(
                    DiffKind::ProfileMissing,
                    target,
                    Value::Bool(true),
                    Value::Bool(false),
                )]),
            }
        }
        for id in remote.keys().filter(|id| !local.contains_key(*id)) {
            diff.extend([SyncDiff::new(
                DiffKind::ProfileMissing,
                DiffTarget::Profile(id.clone()),
                Value::Bool(false),
                Value::Bool(true),
            )]);
        }
        diff.finish()
    }
}

impl Restore for DeviceSnapshot {
    type Context = ();
    type Entity = Vec<RestoredProfile>;

    fn restore(&self, _: &()) -> Result<Vec<RestoredProfile>, SnapshotError> {
        self.domain.require(Self::NODE, &[PROFILES])?;
        self.profiles
            .iter()
            .flatten()
            .map(|(id, profile)| {
                profile.restore(&IdentityRestoreContext {
                    owned_identity: id.clone(),
                })
            })
            .collect()
    }
}
