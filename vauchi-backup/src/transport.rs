// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Transport
//!
//! Uploads, downloads and deletes framed backups on a backup server. Blobs
//! are addressed by the key identifier derived from the seed, a thread id
//! and a version; the seed itself never leaves the device.
//!
//! The backup engine only distinguishes three outcomes. Any finer detail
//! stays inside the transport implementation.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::KeyId;

/// Result of an upload or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    Success,
    RetriableFailure,
    PermanentFailure,
}

/// Why a download produced no blob.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport failed, retry later")]
    Retriable,

    #[error("Transport failed permanently")]
    Permanent,
}

impl TransportOutcome {
    pub fn into_result(self) -> Result<(), TransportError> {
        match self {
            TransportOutcome::Success => Ok(()),
            TransportOutcome::RetriableFailure => Err(TransportError::Retriable),
            TransportOutcome::PermanentFailure => Err(TransportError::Permanent),
        }
    }
}

impl From<TransportError> for TransportOutcome {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Retriable => TransportOutcome::RetriableFailure,
            TransportError::Permanent => TransportOutcome::PermanentFailure,
        }
    }
}

/// Server-side backup storage.
pub trait BackupTransport: Send + Sync {
    fn upload(
        &self,
        server: &str,
        key_id: &KeyId,
        thread: &Uuid,
        version: u64,
        blob: &[u8],
    ) -> TransportOutcome;

    /// Newest blob stored under `thread`.
    fn download(
        &self,
        server: &str,
        key_id: &KeyId,
        thread: &Uuid,
    ) -> Result<Vec<u8>, TransportError>;

    /// Deletes every blob stored for `key_id`.
    fn delete_all(&self, server: &str, key_id: &KeyId) -> TransportOutcome;
}

/// A call observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Upload {
        server: String,
        key_id: KeyId,
        thread: Uuid,
        version: u64,
    },
    Download {
        server: String,
        key_id: KeyId,
        thread: Uuid,
    },
    DeleteAll {
        server: String,
        key_id: KeyId,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<TransportCall>,
    upload_outcomes: VecDeque<TransportOutcome>,
    delete_outcomes: VecDeque<TransportOutcome>,
    download_failures: VecDeque<TransportError>,
    blobs: HashMap<(KeyId, Uuid), BTreeMap<u64, Vec<u8>>>,
}

/// In-memory transport that records calls and returns primed outcomes.
/// Unprimed calls succeed.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of the next upload.
    pub fn push_upload_outcome(&self, outcome: TransportOutcome) {
        self.state.lock().upload_outcomes.push_back(outcome);
    }

    /// Outcome of the next delete.
    pub fn push_delete_outcome(&self, outcome: TransportOutcome) {
        self.state.lock().delete_outcomes.push_back(outcome);
    }

    /// Failure of the next download.
    pub fn push_download_failure(&self, error: TransportError) {
        self.state.lock().download_failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Upload { .. }))
            .count()
    }

    /// Newest stored blob under `thread`, bypassing primed failures.
    pub fn stored(&self, key_id: &KeyId, thread: &Uuid) -> Option<Vec<u8>> {
        self.state
            .lock()
            .blobs
            .get(&(*key_id, *thread))
            .and_then(|versions| versions.values().next_back().cloned())
    }
}

impl BackupTransport for MockTransport {
    fn upload(
        &self,
        server: &str,
        key_id: &KeyId,
        thread: &Uuid,
        version: u64,
        blob: &[u8],
    ) -> TransportOutcome {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Upload {
            server: server.to_string(),
            key_id: *key_id,
            thread: *thread,
            version,
        });
        let outcome = state
            .upload_outcomes
            .pop_front()
            .unwrap_or(TransportOutcome::Success);
        if outcome == TransportOutcome::Success {
            state
                .blobs
                .entry((*key_id, *thread))
                .or_default()
                .insert(version, blob.to_vec());
        }
        outcome
    }

    fn download(
        &self,
        server: &str,
        key_id: &KeyId,
        thread: &Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Download {
            server: server.to_string(),
            key_id: *key_id,
            thread: *thread,
        });
        if let Some(error) = state.download_failures.pop_front() {
            return Err(error);
        }
        state
            .blobs
            .get(&(*key_id, *thread))
            .and_then(|versions| versions.values().next_back().cloned())
            .ok_or(TransportError::Permanent)
    }

    fn delete_all(&self, server: &str, key_id: &KeyId) -> TransportOutcome {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::DeleteAll {
            server: server.to_string(),
            key_id: *key_id,
        });
        let outcome = state
            .delete_outcomes
            .pop_front()
            .unwrap_or(TransportOutcome::Success);
        if outcome == TransportOutcome::Success {
            state.blobs.retain(|(k, _), _| k != key_id);
        }
        outcome
    }
}
