// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot Delegates
//!
//! A delegate is an internal subsystem contributing one tagged slice of a
//! snapshot. The set of delegates is fixed when the engine is built and is
//! handed to the composer as a [`DelegateRegistry`].
//!
//! Restores are two-phase: a delegate stages what it restored and returns a
//! [`RestoreToken`]. The coordinator commits every token once all
//! delegates succeeded, or rolls each one back.

mod identity;
mod store;

use std::collections::HashSet;
use std::sync::Arc;

use crate::model::IdentityId;
use crate::snapshot::{DelegateSnapshot, SnapshotError};

pub use identity::{IdentityDelegate, IDENTITY_DELEGATE_TAG};
pub use store::{IdentityStore, MemoryIdentityStore};

/// A staged restore awaiting finalization.
pub trait RestoreToken: Send {
    /// Makes the staged state final.
    fn commit(self: Box<Self>);

    /// Discards the staged state.
    fn rollback(self: Box<Self>);
}

/// Several tokens treated as one; commits in order, rolls back in reverse.
#[derive(Default)]
pub struct TokenSet {
    tokens: Vec<Box<dyn RestoreToken>>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Box<dyn RestoreToken>) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn commit_all(self) {
        for token in self.tokens {
            token.commit();
        }
    }

    pub fn rollback_all(self) {
        for token in self.tokens.into_iter().rev() {
            token.rollback();
        }
    }
}

impl RestoreToken for TokenSet {
    fn commit(self: Box<Self>) {
        self.commit_all();
    }

    fn rollback(self: Box<Self>) {
        self.rollback_all();
    }
}

/// Contract every contributing subsystem implements.
pub trait SnapshotDelegate: Send + Sync {
    /// Stable tag naming this delegate's part in a backup document.
    fn tag(&self) -> &str;

    /// Current state of the subsystem. `None` asks for the device-wide
    /// snapshot, `Some` for one owned identity's profile.
    fn get_sync_snapshot(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<DelegateSnapshot, SnapshotError>;

    fn serialize(&self, snapshot: &DelegateSnapshot) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<DelegateSnapshot, SnapshotError> {
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    /// Stages a profile restore for `identity`.
    fn restore_owned_identity(
        &self,
        identity: &IdentityId,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError>;

    /// Stages a device-wide restore.
    fn restore_sync_snapshot(
        &self,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError>;
}

/// The fixed set of delegates, built once at startup.
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    delegates: Vec<Arc<dyn SnapshotDelegate>>,
}

impl DelegateRegistry {
    /// Builds the registry; two delegates sharing a tag is an error.
    pub fn new(delegates: Vec<Arc<dyn SnapshotDelegate>>) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::new();
        for delegate in &delegates {
            if !seen.insert(delegate.tag().to_string()) {
                return Err(SnapshotError::DuplicateDelegate(delegate.tag().to_string()));
            }
        }
        Ok(DelegateRegistry { delegates })
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn SnapshotDelegate>> {
        self.delegates.iter().find(|d| d.tag() == tag)
    }

    /// Delegates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SnapshotDelegate>> {
        self.delegates.iter()
    }

    pub fn tags(&self) -> Vec<String> {
        self.delegates.iter().map(|d| d.tag().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}
