// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Error Types
//!
//! Unified error type for the backup subsystem, plus the three-way failure
//! classification the scheduler acts on.

use thiserror::Error;

use crate::crypto::{CryptoError, SeedError};
use crate::document::DocumentError;
use crate::framer::FramingError;
use crate::legacy::AggregationError;
use crate::schedule::SchedulerError;
use crate::snapshot::SnapshotError;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient; try again later with backoff.
    Retriable,
    /// Precondition gone; drop without retrying.
    Permanent,
    /// Local state is inconsistent; surface, never repair silently.
    Invariant,
}

/// Unified error type for backup operations.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// No legacy backup key has been generated.
    #[error("no active backup key")]
    NoActiveKey,

    /// Device backups are not enabled.
    #[error("no active device backup seed")]
    NoActiveSeed,

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl BackupError {
    /// Classifies the failure for retry decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            BackupError::Storage(StorageError::Invariant(_)) => FailureKind::Invariant,
            BackupError::Storage(_) => FailureKind::Retriable,

            BackupError::Transport(TransportError::Retriable) => FailureKind::Retriable,
            BackupError::Transport(TransportError::Permanent) => FailureKind::Permanent,

            BackupError::Snapshot(e) => match e {
                SnapshotError::MissingMandatoryField { .. }
                | SnapshotError::DuplicateDelegate(_)
                | SnapshotError::WrongNode { .. }
                | SnapshotError::InvalidKey(_)
                | SnapshotError::Serialization(_) => FailureKind::Invariant,
                SnapshotError::Delegate { .. } => FailureKind::Retriable,
                SnapshotError::IdentityNotFound(_)
                | SnapshotError::IdentityExists(_)
                | SnapshotError::MissingDelegatePart(_) => FailureKind::Permanent,
            },

            BackupError::Aggregation(_) => FailureKind::Invariant,

            BackupError::Crypto(CryptoError::Rng) => FailureKind::Retriable,
            BackupError::Framing(FramingError::Crypto(CryptoError::Rng)) => FailureKind::Retriable,
            BackupError::Framing(FramingError::Document(DocumentError::Json(_)))
            | BackupError::Document(DocumentError::Json(_)) => FailureKind::Invariant,

            BackupError::Scheduler(SchedulerError::Interrupted) => FailureKind::Retriable,
            BackupError::Scheduler(SchedulerError::Spawn(_)) => FailureKind::Retriable,

            BackupError::InvalidState(_) => FailureKind::Invariant,

            BackupError::Seed(_)
            | BackupError::Crypto(_)
            | BackupError::Framing(_)
            | BackupError::Document(_)
            | BackupError::NoActiveKey
            | BackupError::NoActiveSeed => FailureKind::Permanent,
        }
    }
}

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            BackupError::from(StorageError::Commit("busy".into())).kind(),
            FailureKind::Retriable
        );
        assert_eq!(
            BackupError::from(StorageError::Invariant("two active keys".into())).kind(),
            FailureKind::Invariant
        );
        assert_eq!(BackupError::NoActiveSeed.kind(), FailureKind::Permanent);
        assert_eq!(
            BackupError::from(SnapshotError::IdentityNotFound("ab".into())).kind(),
            FailureKind::Permanent
        );
        assert_eq!(
            BackupError::from(AggregationError::DuplicateTag {
                tag: "contacts".into(),
                version: 1
            })
            .kind(),
            FailureKind::Invariant
        );
        assert_eq!(
            BackupError::from(TransportError::Retriable).kind(),
            FailureKind::Retriable
        );
        assert_eq!(
            BackupError::from(FramingError::MacMismatch).kind(),
            FailureKind::Permanent
        );
    }
}
