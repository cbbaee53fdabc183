// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot Composer
//!
//! Glues per-delegate snapshots into a [`BackupDocument`] and splits a
//! document back into typed snapshots. Composition is all-or-nothing: one
//! failing delegate aborts the whole document.

use std::sync::Arc;

use tracing::debug;

use crate::delegate::{DelegateRegistry, SnapshotDelegate};
use crate::document::BackupDocument;
use crate::model::IdentityId;
use crate::snapshot::{DelegateSnapshot, DiffTarget, SnapshotError, SyncDiff};

/// A document part matched with the delegate that understands it.
pub struct DecomposedPart {
    pub delegate: Arc<dyn SnapshotDelegate>,
    pub snapshot: DelegateSnapshot,
}

#[derive(Clone)]
pub struct SnapshotComposer {
    registry: Arc<DelegateRegistry>,
}

impl SnapshotComposer {
    pub fn new(registry: Arc<DelegateRegistry>) -> Self {
        SnapshotComposer { registry }
    }

    pub fn registry(&self) -> &DelegateRegistry {
        &self.registry
    }

    /// Snapshot of one owned identity across every delegate.
    pub fn compose_profile(
        &self,
        identity: &IdentityId,
        created_at: u64,
    ) -> Result<BackupDocument, SnapshotError> {
        self.compose(Some(identity), created_at)
    }

    /// Device-wide snapshot across every delegate.
    pub fn compose_device(&self, created_at: u64) -> Result<BackupDocument, SnapshotError> {
        self.compose(None, created_at)
    }

    fn compose(
        &self,
        identity: Option<&IdentityId>,
        created_at: u64,
    ) -> Result<BackupDocument, SnapshotError> {
        let mut document = BackupDocument::new(created_at);
        for delegate in self.registry.iter() {
            let snapshot = delegate.get_sync_snapshot(identity)?;
            let bytes = delegate.serialize(&snapshot)?;
            debug!(tag = delegate.tag(), len = bytes.len(), "delegate part composed");
            document.insert_part(delegate.tag(), bytes);
        }
        Ok(document)
    }

    /// Parses every registered delegate's part. A registered tag without a
    /// part aborts before anything is restored; parts no delegate claims are
    /// skipped.
    pub fn decompose(
        &self,
        document: &BackupDocument,
    ) -> Result<Vec<DecomposedPart>, SnapshotError> {
        for tag in document.tags() {
            if self.registry.get(tag).is_none() {
                debug!(tag, "ignoring part without a registered delegate");
            }
        }

        self.registry
            .iter()
            .map(|delegate| {
                let bytes = document
                    .part(delegate.tag())
                    .ok_or_else(|| SnapshotError::MissingDelegatePart(delegate.tag().to_string()))?;
                Ok(DecomposedPart {
                    delegate: Arc::clone(delegate),
                    snapshot: delegate.deserialize(bytes)?,
                })
            })
            .collect()
    }

    /// Differences between a local and a remote document, per delegate.
    pub fn diff_documents(
        &self,
        local: &BackupDocument,
        remote: &BackupDocument,
    ) -> Result<Vec<SyncDiff>, SnapshotError> {
        let local = self.decompose(local)?;
        let remote = self.decompose(remote)?;

        let mut diffs = Vec::new();
        for (l, r) in local.iter().zip(remote.iter()) {
            let scope = DiffTarget::Delegate(l.delegate.tag().to_string());
            diffs.extend(
                l.snapshot
                    .compute_diff(&r.snapshot)
                    .into_iter()
                    .map(|d| d.scoped(&scope)),
            );
        }
        Ok(diffs)
    }
}
