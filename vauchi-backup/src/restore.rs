// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Restore Coordinator
//!
//! Walks the delegates of a decomposed document, collecting their restore
//! tokens. Every token is committed once all delegates succeeded; on the
//! first failure the tokens already obtained are rolled back, newest first,
//! and the original error is returned.

use tracing::{info, warn};

use crate::composer::{DecomposedPart, SnapshotComposer};
use crate::delegate::{RestoreToken, TokenSet};
use crate::document::BackupDocument;
use crate::model::IdentityId;
use crate::snapshot::SnapshotError;

#[derive(Clone)]
pub struct RestoreCoordinator {
    composer: SnapshotComposer,
}

impl RestoreCoordinator {
    pub fn new(composer: SnapshotComposer) -> Self {
        RestoreCoordinator { composer }
    }

    /// Restores one owned identity from a profile document.
    pub fn restore_profile(
        &self,
        identity: &IdentityId,
        document: &BackupDocument,
    ) -> Result<(), SnapshotError> {
        let parts = self.composer.decompose(document)?;
        Self::run(&parts, |part| {
            part.delegate
                .restore_owned_identity(identity, &part.snapshot)
        })?;
        info!(identity = %identity, "profile backup restored");
        Ok(())
    }

    /// Restores every subsystem from a device document.
    pub fn restore_device(&self, document: &BackupDocument) -> Result<(), SnapshotError> {
        let parts = self.composer.decompose(document)?;
        Self::run(&parts, |part| part.delegate.restore_sync_snapshot(&part.snapshot))?;
        info!(delegates = parts.len(), "device backup restored");
        Ok(())
    }

    fn run<F>(parts: &[DecomposedPart], mut restore: F) -> Result<(), SnapshotError>
    where
        F: FnMut(&DecomposedPart) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError>,
    {
        let mut tokens = TokenSet::new();
        for part in parts {
            match restore(part) {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        tag = part.delegate.tag(),
                        rolled_back = tokens.len(),
                        error = %e,
                        "restore failed, rolling back"
                    );
                    tokens.rollback_all();
                    return Err(e);
                }
            }
        }
        tokens.commit_all();
        Ok(())
    }
}
