// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Delegate wiring the identity subsystem into backups.

use std::sync::Arc;

use tracing::debug;

use super::{IdentityStore, RestoreToken, SnapshotDelegate, TokenSet};
use crate::model::IdentityId;
use crate::snapshot::{
    DelegateSnapshot, DeviceSnapshot, IdentityRestoreContext, IdentitySnapshot, Restore,
    SnapshotError,
};

pub const IDENTITY_DELEGATE_TAG: &str = "identity";

/// Contributes owned identities, contacts and groups.
pub struct IdentityDelegate {
    store: Arc<dyn IdentityStore>,
}

impl IdentityDelegate {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        IdentityDelegate { store }
    }
}

impl SnapshotDelegate for IdentityDelegate {
    fn tag(&self) -> &str {
        IDENTITY_DELEGATE_TAG
    }

    fn get_sync_snapshot(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<DelegateSnapshot, SnapshotError> {
        let Some(id) = identity else {
            let identities = self.store.owned_identities();
            return Ok(DelegateSnapshot::Device(DeviceSnapshot::of(&identities)));
        };

        let owned = self
            .store
            .owned_identity(id)
            .ok_or_else(|| SnapshotError::IdentityNotFound(id.to_hex()))?;
        Ok(DelegateSnapshot::Identity(IdentitySnapshot::of(
            &owned,
            &self.store.contacts(id),
            &self.store.groups_v1(id),
            &self.store.groups_v2(id),
        )))
    }

    fn restore_owned_identity(
        &self,
        identity: &IdentityId,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError> {
        let profile = snapshot.as_identity()?.restore(&IdentityRestoreContext {
            owned_identity: identity.clone(),
        })?;
        debug!(
            identity = %identity,
            contacts = profile.contacts.len(),
            "staging restored profile"
        );
        Ok(Some(self.store.stage_profile(profile)?))
    }

    fn restore_sync_snapshot(
        &self,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError> {
        let profiles = snapshot.as_device()?.restore(&())?;

        let mut tokens = TokenSet::new();
        for profile in profiles {
            match self.store.stage_profile(profile) {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    tokens.rollback_all();
                    return Err(e);
                }
            }
        }
        Ok(Some(Box::new(tokens)))
    }
}
