// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Vauchi Backup Library
//!
//! Encrypted backups and cross-device reconciliation of owned identities.
//! Snapshots of every contributing subsystem are composed into one
//! document, framed (encrypt-then-MAC) under keys derived from a backup
//! seed, and uploaded on a coalescing schedule with exponential backoff.

pub mod composer;
pub mod config;
pub mod crypto;
pub mod delegate;
pub mod device_backup;
pub mod document;
pub mod error;
pub mod framer;
pub mod legacy;
pub mod model;
pub mod restore;
pub mod schedule;
pub mod service;
pub mod snapshot;
pub mod storage;
pub mod transport;

pub use composer::{DecomposedPart, SnapshotComposer};
pub use config::BackupConfig;
pub use crypto::{
    BackupSeed, CryptoError, CryptoProvider, DefaultCryptoProvider, DerivedBackupKeys, KeyId,
    SeedError, SeedStatus, SymmetricKey,
};
pub use delegate::{
    DelegateRegistry, IdentityDelegate, IdentityStore, MemoryIdentityStore, RestoreToken,
    SnapshotDelegate, TokenSet,
};
pub use device_backup::{DeviceBackupDeps, DeviceBackupService};
pub use document::{BackupDocument, DocumentError, CURRENT_FORMAT_VERSION};
pub use error::{BackupError, BackupResult, FailureKind};
pub use framer::{BackupFramer, FramingError};
pub use legacy::{
    AggregationError, LegacyBackupDelegate, LegacyBackupManager, LegacyBackupRequest,
    PartReporter, PartialBackup,
};
pub use model::{
    Contact, GroupDetails, GroupPermission, GroupV1, GroupV2, IdentityDetails, IdentityId,
    KeycloakBinding, OwnedIdentity, PrivateIdentity, RestoredProfile, TrustOrigin,
};
pub use restore::RestoreCoordinator;
pub use schedule::{
    BackupRunner, BackupScheduler, BackupTarget, RunOutcome, Schedule, ScheduledBackup,
    SchedulerError,
};
pub use service::{BackupNotification, BackupService, BackupServiceBuilder};
pub use snapshot::{DelegateSnapshot, Domain, SnapshotError, SyncAtom, SyncDiff};
pub use storage::{Storage, StorageError};
pub use transport::{BackupTransport, MockTransport, TransportError, TransportOutcome};
