// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Service
//!
//! Wires storage, crypto, transport and the contributing subsystems into
//! the device backup service and the legacy backup manager. Both share one
//! worker thread and one timer thread.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::composer::SnapshotComposer;
use crate::config::BackupConfig;
use crate::crypto::{CryptoProvider, DefaultCryptoProvider, SymmetricKey};
use crate::delegate::{DelegateRegistry, IdentityDelegate, IdentityStore, SnapshotDelegate};
use crate::device_backup::{DeviceBackupDeps, DeviceBackupService};
use crate::error::{BackupError, BackupResult};
use crate::framer::BackupFramer;
use crate::legacy::{LegacyBackupDelegate, LegacyBackupManager};
use crate::model::IdentityId;
use crate::schedule::{DelayedTasks, SchedulerError, Worker};
use crate::storage::Storage;
use crate::transport::BackupTransport;

/// Events from the rest of the engine that affect backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupNotification {
    /// Something a legacy backup covers changed; debounced.
    IdentityContentChanged,
    DeviceBackupNeeded,
    ProfileBackupNeeded(IdentityId),
    OwnedIdentityDeleted(IdentityId),
}

/// The backup subsystem.
pub struct BackupService {
    device: Arc<DeviceBackupService>,
    legacy: LegacyBackupManager,
}

impl BackupService {
    pub fn builder() -> BackupServiceBuilder {
        BackupServiceBuilder::new()
    }

    pub fn device(&self) -> &DeviceBackupService {
        &self.device
    }

    pub fn legacy(&self) -> &LegacyBackupManager {
        &self.legacy
    }

    /// Re-arms persisted schedules. Call once at startup.
    pub fn start(&self) -> BackupResult<()> {
        self.device.initial_schedule()
    }

    pub fn notify(&self, notification: BackupNotification) -> BackupResult<()> {
        match notification {
            BackupNotification::IdentityContentChanged => self.legacy.on_content_changed(),
            BackupNotification::DeviceBackupNeeded => self.device.request_device_backup(),
            BackupNotification::ProfileBackupNeeded(identity) => {
                self.device.request_profile_backup(&identity)
            }
            BackupNotification::OwnedIdentityDeleted(identity) => {
                self.device.on_owned_identity_deleted(&identity)?
            }
        }
        Ok(())
    }

    /// Forces every device and profile backup and waits for them. Returns
    /// whether none hit a retriable failure.
    pub fn run_now(&self, timeout: Duration) -> BackupResult<bool> {
        Ok(self.device.scheduler().run_now(timeout)?)
    }

    pub fn retry_now(&self) {
        self.device.scheduler().retry_now();
    }

    pub fn cancel_all(&self) {
        self.device.scheduler().cancel_all();
    }
}

/// Builder for creating a [`BackupService`].
pub struct BackupServiceBuilder {
    config: BackupConfig,
    storage: Option<Storage>,
    storage_key: Option<SymmetricKey>,
    crypto: Option<Arc<dyn CryptoProvider>>,
    transport: Option<Arc<dyn BackupTransport>>,
    identities: Option<Arc<dyn IdentityStore>>,
    delegates: Vec<Arc<dyn SnapshotDelegate>>,
    legacy_delegates: Vec<Arc<dyn LegacyBackupDelegate>>,
}

impl BackupServiceBuilder {
    pub fn new() -> Self {
        BackupServiceBuilder {
            config: BackupConfig::default(),
            storage: None,
            storage_key: None,
            crypto: None,
            transport: None,
            identities: None,
            delegates: Vec::new(),
            legacy_delegates: Vec::new(),
        }
    }

    pub fn config(mut self, config: BackupConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an already opened storage instead of `config.storage_path`.
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Key protecting secrets in the database at `config.storage_path`.
    pub fn storage_key(mut self, key: SymmetricKey) -> Self {
        self.storage_key = Some(key);
        self
    }

    /// Overrides [`DefaultCryptoProvider`].
    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn BackupTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The identity subsystem. Always registered as the first snapshot
    /// delegate.
    pub fn identities(mut self, identities: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Registers an additional snapshot delegate.
    pub fn delegate(mut self, delegate: Arc<dyn SnapshotDelegate>) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn legacy_delegate(mut self, delegate: Arc<dyn LegacyBackupDelegate>) -> Self {
        self.legacy_delegates.push(delegate);
        self
    }

    pub fn build(self) -> BackupResult<BackupService> {
        let storage = match (self.storage, self.storage_key) {
            (Some(storage), _) => storage,
            (None, Some(key)) => Storage::open(&self.config.storage_path, key)?,
            (None, None) => {
                return Err(BackupError::InvalidState(
                    "either a storage or a storage key is required".into(),
                ))
            }
        };
        let transport = self
            .transport
            .ok_or_else(|| BackupError::InvalidState("transport is required".into()))?;
        let identities = self
            .identities
            .ok_or_else(|| BackupError::InvalidState("identity store is required".into()))?;
        let crypto = self
            .crypto
            .unwrap_or_else(|| Arc::new(DefaultCryptoProvider::new()));

        let worker = Arc::new(
            Worker::new("vauchi-backup-worker").map_err(|e| SchedulerError::Spawn(e.to_string()))?,
        );
        let timers = Arc::new(
            DelayedTasks::new("vauchi-backup-timers")
                .map_err(|e| SchedulerError::Spawn(e.to_string()))?,
        );

        let mut delegates: Vec<Arc<dyn SnapshotDelegate>> =
            vec![Arc::new(IdentityDelegate::new(Arc::clone(&identities)))];
        delegates.extend(self.delegates);
        let composer = SnapshotComposer::new(Arc::new(DelegateRegistry::new(delegates)?));
        let snapshot_delegates = composer.registry().len();

        let storage = Arc::new(Mutex::new(storage));
        let framer = BackupFramer::new(crypto);

        let legacy = LegacyBackupManager::new(
            Arc::clone(&storage),
            framer.clone(),
            self.legacy_delegates,
            Arc::clone(&worker),
            Arc::clone(&timers),
            &self.config,
        )?;
        let device = DeviceBackupService::new(
            DeviceBackupDeps {
                storage,
                composer,
                framer,
                transport,
                identities,
                worker,
                timers,
            },
            self.config,
        );

        info!(
            snapshot_delegates,
            legacy_delegates = legacy.tags().len(),
            "backup service built"
        );
        Ok(BackupService { device, legacy })
    }
}

impl Default for BackupServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
