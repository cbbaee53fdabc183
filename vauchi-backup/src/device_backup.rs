// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Backups
//!
//! With a device backup seed configured, the whole device and every owned
//! profile are backed up periodically to the seed's server. The device
//! document goes to the seed's own thread; each profile has a thread of
//! its own, created on first use. Replacing or deactivating the seed leaves
//! the old one inactive until its backups are deleted server-side.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::composer::SnapshotComposer;
use crate::config::BackupConfig;
use crate::crypto::{BackupSeed, SeedStatus};
use crate::delegate::IdentityStore;
use crate::document::BackupDocument;
use crate::error::{BackupError, BackupResult, FailureKind};
use crate::framer::BackupFramer;
use crate::model::IdentityId;
use crate::restore::RestoreCoordinator;
use crate::schedule::{
    now_millis, BackupRunner, BackupScheduler, DelayedTasks, RunOutcome, TaskHandle, Worker,
};
use crate::snapshot::SnapshotError;
use crate::storage::{DeviceBackupSeedRecord, Storage};
use crate::transport::{BackupTransport, TransportOutcome};

/// Collaborators of the device backup service.
pub struct DeviceBackupDeps {
    pub storage: Arc<Mutex<Storage>>,
    pub composer: SnapshotComposer,
    pub framer: BackupFramer,
    pub transport: Arc<dyn BackupTransport>,
    pub identities: Arc<dyn IdentityStore>,
    pub worker: Arc<Worker>,
    pub timers: Arc<DelayedTasks>,
}

/// Periodic device and profile backups under a device backup seed.
pub struct DeviceBackupService {
    storage: Arc<Mutex<Storage>>,
    composer: SnapshotComposer,
    coordinator: RestoreCoordinator,
    framer: BackupFramer,
    transport: Arc<dyn BackupTransport>,
    identities: Arc<dyn IdentityStore>,
    scheduler: BackupScheduler,
    worker: Arc<Worker>,
    timers: Arc<DelayedTasks>,
    config: BackupConfig,
    cleanup_timer: Mutex<Option<TaskHandle>>,
    this: Weak<DeviceBackupService>,
}

impl DeviceBackupService {
    /// Creates the service together with the scheduler driving it.
    pub fn new(deps: DeviceBackupDeps, config: BackupConfig) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<DeviceBackupService>| {
            let runner: Weak<dyn BackupRunner> = this.clone();
            let scheduler = BackupScheduler::new(
                runner,
                config.retry_base_delay,
                Arc::clone(&deps.worker),
                Arc::clone(&deps.timers),
            );
            DeviceBackupService {
                storage: deps.storage,
                coordinator: RestoreCoordinator::new(deps.composer.clone()),
                composer: deps.composer,
                framer: deps.framer,
                transport: deps.transport,
                identities: deps.identities,
                scheduler,
                worker: deps.worker,
                timers: deps.timers,
                config,
                cleanup_timer: Mutex::new(None),
                this: this.clone(),
            }
        })
    }

    pub fn scheduler(&self) -> &BackupScheduler {
        &self.scheduler
    }

    // === Seed Lifecycle ===

    /// Enables device backups to `server` with a fresh seed and backs up the
    /// device and every owned profile right away. A previously active seed
    /// becomes inactive and its backups are deleted.
    pub fn generate_device_backup_seed<R: RngCore + CryptoRng>(
        &self,
        server: &str,
        rng: &mut R,
    ) -> BackupResult<BackupSeed> {
        let seed = BackupSeed::generate(rng);
        let thread = Uuid::new_v4();
        self.storage
            .lock()
            .transaction(|s| s.insert_device_backup_seed(&seed, server, thread))?;
        info!(server, "device backup seed generated");

        self.scheduler.schedule_device_backup(0);
        for identity in self.identities.owned_identities() {
            self.scheduler.schedule_profile_backup(&identity.id, 0);
        }
        self.schedule_cleanup(Duration::ZERO);
        Ok(seed)
    }

    /// Disables device backups. Pending runs fail permanently.
    pub fn deactivate_device_backup_seed(&self) -> BackupResult<bool> {
        let deactivated = self.storage.lock().deactivate_device_backup_seed()?;
        if deactivated {
            info!("device backup seed deactivated");
            self.schedule_cleanup(Duration::ZERO);
        }
        Ok(deactivated)
    }

    pub fn active_device_backup_seed(&self) -> BackupResult<Option<DeviceBackupSeedRecord>> {
        Ok(self.storage.lock().active_device_backup_seed()?)
    }

    /// Deletes the server-side backups of every inactive seed. Returns how
    /// many seeds are still waiting for a retry.
    pub fn cleanup_inactive_seeds(&self) -> BackupResult<usize> {
        let seeds = self.storage.lock().inactive_device_backup_seeds()?;
        let mut pending = 0;

        for record in seeds {
            let keys = self.framer.derive_keys(&record.seed)?;
            match self.transport.delete_all(&record.server, &keys.key_id) {
                TransportOutcome::Success => {
                    self.storage.lock().delete_device_backup_seed(record.id)?;
                    debug!(seed = record.id, "inactive seed cleaned up");
                }
                TransportOutcome::PermanentFailure => {
                    self.storage.lock().delete_device_backup_seed(record.id)?;
                    warn!(seed = record.id, "inactive seed dropped, server refused deletion");
                }
                TransportOutcome::RetriableFailure => pending += 1,
            }
        }

        if pending > 0 {
            warn!(
                pending,
                retry_in_secs = self.config.legacy_cleanup_retry_delay.as_secs(),
                "inactive seed cleanup incomplete"
            );
            self.schedule_cleanup(self.config.legacy_cleanup_retry_delay);
        }
        Ok(pending)
    }

    fn schedule_cleanup(&self, delay: Duration) {
        let this = self.this.clone();
        let handle = self.timers.schedule(delay, move || {
            if let Some(service) = this.upgrade() {
                let target = Arc::clone(&service);
                service.worker.submit(move || {
                    if let Err(e) = target.cleanup_inactive_seeds() {
                        warn!(error = %e, "inactive seed cleanup failed");
                        if e.kind() == FailureKind::Retriable {
                            target.schedule_cleanup(target.config.legacy_cleanup_retry_delay);
                        }
                    }
                });
            }
        });
        if let Some(previous) = self.cleanup_timer.lock().replace(handle) {
            previous.cancel();
        }
    }

    // === Scheduling ===

    /// Re-arms device and profile runs from their persisted deadlines.
    pub fn initial_schedule(&self) -> BackupResult<()> {
        let (device, profiles, has_inactive) = {
            let storage = self.storage.lock();
            let device = storage.active_device_backup_seed()?;
            let mut profiles = Vec::new();
            if device.is_some() {
                for identity in self.identities.owned_identities() {
                    let thread = storage.get_or_create_profile_backup_thread(&identity.id)?;
                    profiles.push((identity.id, thread.next_backup_at));
                }
            }
            let has_inactive = !storage.inactive_device_backup_seeds()?.is_empty();
            (device, profiles, has_inactive)
        };

        if let Some(seed) = device {
            self.scheduler.schedule_device_backup(seed.next_backup_at);
        }
        for (identity, next) in &profiles {
            self.scheduler.schedule_profile_backup(identity, *next);
        }
        if has_inactive {
            self.schedule_cleanup(Duration::ZERO);
        }
        debug!(profiles = profiles.len(), "backup schedule restored");
        Ok(())
    }

    /// Asks for a device backup now. A sooner pending run wins.
    pub fn request_device_backup(&self) {
        self.scheduler.schedule_device_backup(now_millis());
    }

    pub fn request_profile_backup(&self, identity: &IdentityId) {
        self.scheduler.schedule_profile_backup(identity, now_millis());
    }

    /// Forgets the profile thread of a deleted identity.
    pub fn on_owned_identity_deleted(&self, identity: &IdentityId) -> BackupResult<()> {
        self.scheduler.unschedule_profile_backup(identity);
        if self.storage.lock().delete_profile_backup_thread(identity)? {
            debug!(identity = %identity, "profile backup thread deleted");
        }
        Ok(())
    }

    // === Restore ===

    /// Fetches the newest blob stored under `thread`.
    pub fn fetch_backup(
        &self,
        seed: &BackupSeed,
        server: &str,
        thread: &Uuid,
    ) -> BackupResult<Vec<u8>> {
        let keys = self.framer.derive_keys(seed)?;
        Ok(self.transport.download(server, &keys.key_id, thread)?)
    }

    pub fn validate_backup_seed(&self, seed_text: &str, blob: &[u8]) -> SeedStatus {
        self.framer.validate(seed_text, blob)
    }

    /// Restores every subsystem from a device backup, all or nothing.
    pub fn restore_device_backup(&self, seed_text: &str, blob: &[u8]) -> BackupResult<()> {
        let document = self.framer.unframe_text(seed_text, blob)?;
        self.coordinator.restore_device(&document)?;
        Ok(())
    }

    /// Restores one owned identity from a profile backup, all or nothing.
    pub fn restore_profile_backup(
        &self,
        seed_text: &str,
        blob: &[u8],
        identity: &IdentityId,
    ) -> BackupResult<()> {
        let document = self.framer.unframe_text(seed_text, blob)?;
        self.coordinator.restore_profile(identity, &document)?;
        Ok(())
    }

    // === Runs ===

    fn device_backup(&self) -> BackupResult<u64> {
        let record = self
            .storage
            .lock()
            .active_device_backup_seed()?
            .ok_or(BackupError::NoActiveSeed)?;

        let now = now_millis();
        let document = self.composer.compose_device(now)?;
        self.upload(&record, &record.thread_id, now, &document)?;

        let next = now.saturating_add(self.config.device_backup_interval.as_millis() as u64);
        let storage = self.storage.lock();
        match storage.active_device_backup_seed()? {
            Some(active) if active.id == record.id => {}
            _ => return Err(BackupError::NoActiveSeed),
        }
        storage.set_device_backup_next(record.id, next)?;
        Ok(next)
    }

    fn profile_backup(&self, identity: &IdentityId) -> BackupResult<u64> {
        if self.identities.owned_identity(identity).is_none() {
            return Err(SnapshotError::IdentityNotFound(identity.to_hex()).into());
        }
        let (record, thread) = {
            let storage = self.storage.lock();
            let record = storage
                .active_device_backup_seed()?
                .ok_or(BackupError::NoActiveSeed)?;
            let thread = storage.get_or_create_profile_backup_thread(identity)?;
            (record, thread)
        };

        let now = now_millis();
        let document = self.composer.compose_profile(identity, now)?;
        self.upload(&record, &thread.thread_id, now, &document)?;

        let next = now.saturating_add(self.config.profile_backup_interval.as_millis() as u64);
        self.storage.lock().set_profile_backup_next(identity, next)?;
        Ok(next)
    }

    fn upload(
        &self,
        record: &DeviceBackupSeedRecord,
        thread: &Uuid,
        version: u64,
        document: &BackupDocument,
    ) -> BackupResult<()> {
        let keys = self.framer.derive_keys(&record.seed)?;
        let blob =
            self.framer
                .frame_with_keys(&keys.public_key, &keys.mac_key, document, &mut OsRng)?;
        self.transport
            .upload(&record.server, &keys.key_id, thread, version, &blob)
            .into_result()?;
        Ok(())
    }
}

fn run_outcome(result: BackupResult<u64>, run: &str) -> RunOutcome {
    match result {
        Ok(next_run) => RunOutcome::Success { next_run },
        Err(e) => match e.kind() {
            FailureKind::Retriable => {
                debug!(run, error = %e, "backup run failed");
                RunOutcome::RetriableFailure
            }
            FailureKind::Permanent => {
                debug!(run, error = %e, "backup run abandoned");
                RunOutcome::PermanentFailure
            }
            FailureKind::Invariant => {
                error!(run, error = %e, "backup run hit an invariant violation");
                RunOutcome::PermanentFailure
            }
        },
    }
}

impl BackupRunner for DeviceBackupService {
    fn run_device_backup(&self) -> RunOutcome {
        run_outcome(self.device_backup(), "device")
    }

    fn run_profile_backup(&self, identity: &IdentityId) -> RunOutcome {
        run_outcome(self.profile_backup(identity), "profile")
    }

    fn owned_identities(&self) -> Vec<IdentityId> {
        self.identities
            .owned_identities()
            .into_iter()
            .map(|identity| identity.id)
            .collect()
    }
}
