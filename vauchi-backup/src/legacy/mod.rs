// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Legacy Whole-Engine Backups
//!
//! One backup key (the seed is shown once and never stored) and numbered
//! backup versions. A version is produced by fanning a request out to every
//! [`LegacyBackupDelegate`]; each reports its part from its own thread and
//! the reports are handled on the shared backup worker. The version becomes
//! READY once every part is in, or FAILED on the first failure, a duplicate
//! report, or the ongoing-backup timeout.

mod aggregator;

pub use aggregator::{AggregationError, PartialBackup};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, error, info, warn};

use crate::config::BackupConfig;
use crate::crypto::{BackupSeed, KeyId, SeedStatus};
use crate::document::{BackupDocument, CURRENT_FORMAT_VERSION};
use crate::error::{BackupError, BackupResult};
use crate::framer::BackupFramer;
use crate::schedule::{now_millis, DelayedTasks, TaskHandle, Worker};
use crate::snapshot::SnapshotError;
use crate::storage::{BackupKeyRecord, BackupRecord, BackupStatus, Storage};

/// A subsystem contributing one tagged part to legacy backups.
pub trait LegacyBackupDelegate: Send + Sync {
    fn tag(&self) -> &str;

    /// Starts producing this subsystem's part. The result goes through
    /// `request.reporter`, from any thread, before or after this returns.
    fn initiate_backup(&self, request: LegacyBackupRequest);

    /// Restores this subsystem from its part of a legacy backup.
    fn restore_backup(&self, part: &[u8]) -> Result<(), String>;
}

/// One delegate's share of a backup run.
pub struct LegacyBackupRequest {
    pub key_id: KeyId,
    pub version: u32,
    pub for_export: bool,
    pub reporter: PartReporter,
}

/// Reports a delegate's part back to the manager.
#[derive(Clone)]
pub struct PartReporter {
    inner: Weak<Inner>,
    key_id: KeyId,
    version: u32,
    tag: String,
}

impl PartReporter {
    /// Hands over the part. Reporting twice for the same version fails it.
    pub fn success(&self, part: Vec<u8>) -> BackupResult<()> {
        self.report(Ok(part))
    }

    /// Fails the whole version.
    pub fn failure(&self, reason: impl Into<String>) -> BackupResult<()> {
        self.report(Err(reason.into()))
    }

    fn report(&self, result: Result<Vec<u8>, String>) -> BackupResult<()> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| BackupError::InvalidState("backup manager shut down".into()))?;
        inner.report(self.key_id, self.version, self.tag.clone(), result)
    }
}

struct Ongoing {
    partial: PartialBackup,
    timeout: TaskHandle,
}

struct Inner {
    storage: Arc<Mutex<Storage>>,
    framer: BackupFramer,
    delegates: Vec<Arc<dyn LegacyBackupDelegate>>,
    worker: Arc<Worker>,
    timers: Arc<DelayedTasks>,
    ongoing_timeout: Duration,
    debounce: Duration,
    ongoing: Mutex<HashMap<(KeyId, u32), Ongoing>>,
    debounce_timer: Mutex<Option<TaskHandle>>,
}

/// Key lifecycle and version production for legacy backups.
pub struct LegacyBackupManager {
    inner: Arc<Inner>,
}

impl LegacyBackupManager {
    pub fn new(
        storage: Arc<Mutex<Storage>>,
        framer: BackupFramer,
        delegates: Vec<Arc<dyn LegacyBackupDelegate>>,
        worker: Arc<Worker>,
        timers: Arc<DelayedTasks>,
        config: &BackupConfig,
    ) -> BackupResult<Self> {
        let mut seen = HashSet::new();
        for delegate in &delegates {
            if !seen.insert(delegate.tag().to_string()) {
                return Err(SnapshotError::DuplicateDelegate(delegate.tag().to_string()).into());
            }
        }

        Ok(LegacyBackupManager {
            inner: Arc::new(Inner {
                storage,
                framer,
                delegates,
                worker,
                timers,
                ongoing_timeout: config.ongoing_backup_timeout,
                debounce: config.content_change_debounce,
                ongoing: Mutex::new(HashMap::new()),
                debounce_timer: Mutex::new(None),
            }),
        })
    }

    /// Tags of the contributing delegates.
    pub fn tags(&self) -> Vec<String> {
        self.inner
            .delegates
            .iter()
            .map(|d| d.tag().to_string())
            .collect()
    }

    // === Key Lifecycle ===

    /// Generates a new backup key, replacing the previous one and every
    /// backup made with it. Returns the seed for display; it is not stored.
    pub fn generate_backup_key<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> BackupResult<BackupSeed> {
        let seed = BackupSeed::generate(rng);
        let keys = self.inner.framer.derive_keys(&seed)?;
        let record = BackupKeyRecord::new(
            keys.key_id,
            keys.public_key.clone(),
            keys.mac_key.clone(),
            now_millis(),
        );

        self.inner
            .storage
            .lock()
            .transaction(|s| s.replace_backup_key(&record))?;

        let abandoned: Vec<Ongoing> = self
            .inner
            .ongoing
            .lock()
            .drain()
            .map(|(_, ongoing)| ongoing)
            .collect();
        for ongoing in abandoned {
            ongoing.timeout.cancel();
        }

        info!(key_id = %keys.key_id.to_hex(), "backup key generated");
        Ok(seed)
    }

    pub fn active_key(&self) -> BackupResult<Option<BackupKeyRecord>> {
        Ok(self.inner.storage.lock().active_backup_key()?)
    }

    /// Checks a seed typed by the user against the active key.
    pub fn verify_backup_seed(&self, seed_text: &str) -> BackupResult<SeedStatus> {
        let seed = match BackupSeed::parse(seed_text) {
            Ok(seed) => seed,
            Err(e) => return Ok(SeedStatus::from(&e)),
        };
        let keys = self.inner.framer.derive_keys(&seed)?;

        let storage = self.inner.storage.lock();
        let active = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
        if active.key_id != keys.key_id {
            return Ok(SeedStatus::BadKey);
        }
        storage.record_key_verification(&active.key_id, now_millis())?;
        Ok(SeedStatus::Success)
    }

    // === Versions ===

    /// Starts a new backup version and returns it.
    pub fn initiate_backup(&self, for_export: bool) -> BackupResult<u32> {
        self.inner.initiate(for_export)
    }

    /// Debounces the automatic backup after a content change.
    pub fn on_content_changed(&self) {
        let inner = Arc::downgrade(&self.inner);
        let handle = self.inner.timers.schedule(self.inner.debounce, move || {
            if let Some(inner) = inner.upgrade() {
                let target = Arc::clone(&inner);
                inner.worker.submit(move || target.automatic_backup());
            }
        });
        if let Some(previous) = self.inner.debounce_timer.lock().replace(handle) {
            previous.cancel();
        }
    }

    pub fn backup(&self, version: u32) -> BackupResult<Option<BackupRecord>> {
        let storage = self.inner.storage.lock();
        let key = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
        Ok(storage.get_backup(&key.key_id, version)?)
    }

    /// Newest backup that can be exported or uploaded.
    pub fn latest_backup(&self) -> BackupResult<Option<BackupRecord>> {
        let storage = self.inner.storage.lock();
        let key = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
        Ok(storage.latest_ready_backup(&key.key_id)?)
    }

    /// Versions still waiting for parts.
    pub fn ongoing_versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.inner.ongoing.lock().keys().map(|(_, v)| *v).collect();
        versions.sort_unstable();
        versions
    }

    pub fn mark_backup_exported(&self, version: u32) -> BackupResult<bool> {
        self.mark_delivered(version, true)
    }

    pub fn mark_backup_uploaded(&self, version: u32) -> BackupResult<bool> {
        self.mark_delivered(version, false)
    }

    fn mark_delivered(&self, version: u32, exported: bool) -> BackupResult<bool> {
        let storage = self.inner.storage.lock();
        let key = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
        let now = now_millis();
        let marked = storage
            .transaction(|s| s.mark_backup_delivered(&key.key_id, version, exported, now))?;
        if marked {
            info!(version, exported, "backup delivered");
        }
        Ok(marked)
    }

    // === Restore ===

    /// Restores every delegate from a legacy backup. All parts are checked
    /// for presence before any delegate restores.
    pub fn restore_legacy_backup(&self, seed_text: &str, blob: &[u8]) -> BackupResult<()> {
        let document = self.inner.framer.unframe_text(seed_text, blob)?;

        let mut parts = Vec::with_capacity(self.inner.delegates.len());
        for delegate in &self.inner.delegates {
            let part = document
                .part(delegate.tag())
                .ok_or_else(|| SnapshotError::MissingDelegatePart(delegate.tag().to_string()))?;
            parts.push((delegate, part));
        }

        for (delegate, part) in parts {
            delegate
                .restore_backup(part)
                .map_err(|reason| SnapshotError::Delegate {
                    tag: delegate.tag().to_string(),
                    reason,
                })?;
        }
        info!(parts = self.inner.delegates.len(), "legacy backup restored");
        Ok(())
    }
}

impl Inner {
    fn initiate(self: &Arc<Self>, for_export: bool) -> BackupResult<u32> {
        let (key_id, version) = {
            let storage = self.storage.lock();
            let key = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
            let version = storage.transaction(|s| {
                let version = s.next_backup_version(&key.key_id)?;
                s.insert_backup(&BackupRecord {
                    key_id: key.key_id,
                    version,
                    status: BackupStatus::Ongoing,
                    for_export,
                    format_version: CURRENT_FORMAT_VERSION,
                    payload: None,
                    status_changed_at: now_millis(),
                })?;
                Ok(version)
            })?;
            (key.key_id, version)
        };

        let timeout = {
            let inner = Arc::downgrade(self);
            self.timers.schedule(self.ongoing_timeout, move || {
                if let Some(inner) = inner.upgrade() {
                    let target = Arc::clone(&inner);
                    inner.worker.submit(move || target.expire(key_id, version));
                }
            })
        };
        let partial = PartialBackup::new(key_id, version, self.delegates.iter().map(|d| d.tag()));
        self.ongoing
            .lock()
            .insert((key_id, version), Ongoing { partial, timeout });
        info!(version, for_export, parts = self.delegates.len(), "legacy backup initiated");

        if self.delegates.is_empty() {
            let inner = Arc::clone(self);
            self.worker
                .run_blocking(move || inner.complete_if_ready(key_id, version))
                .ok_or_else(|| BackupError::InvalidState("backup worker stopped".into()))?;
        }

        for delegate in &self.delegates {
            delegate.initiate_backup(LegacyBackupRequest {
                key_id,
                version,
                for_export,
                reporter: PartReporter {
                    inner: Arc::downgrade(self),
                    key_id,
                    version,
                    tag: delegate.tag().to_string(),
                },
            });
        }
        Ok(version)
    }

    fn automatic_backup(self: &Arc<Self>) {
        match self.initiate(false) {
            Ok(version) => debug!(version, "automatic backup started"),
            Err(BackupError::NoActiveKey) => debug!("no backup key, skipping automatic backup"),
            Err(e) => warn!(error = %e, "automatic backup could not start"),
        }
    }

    fn report(
        self: &Arc<Self>,
        key_id: KeyId,
        version: u32,
        tag: String,
        result: Result<Vec<u8>, String>,
    ) -> BackupResult<()> {
        let inner = Arc::clone(self);
        self.worker
            .run_blocking(move || inner.handle_report(key_id, version, &tag, result))
            .unwrap_or_else(|| Err(BackupError::InvalidState("backup worker stopped".into())))
    }

    /// Runs on the worker.
    fn handle_report(
        &self,
        key_id: KeyId,
        version: u32,
        tag: &str,
        result: Result<Vec<u8>, String>,
    ) -> BackupResult<()> {
        let slot = (key_id, version);
        let mut ongoing = self.ongoing.lock();
        let Some(entry) = ongoing.get_mut(&slot) else {
            debug!(version, tag, "part reported for a backup that is not ongoing");
            return Err(BackupError::InvalidState(format!(
                "backup version {} is not ongoing",
                version
            )));
        };

        let added = match result {
            Ok(part) => entry.partial.add_part(tag, part),
            Err(reason) => {
                warn!(version, tag, %reason, "legacy backup part failed");
                if let Some(entry) = ongoing.remove(&slot) {
                    entry.timeout.cancel();
                }
                drop(ongoing);
                self.fail(key_id, version);
                return Ok(());
            }
        };

        match added {
            Ok(false) => Ok(()),
            Ok(true) => {
                let entry = ongoing.remove(&slot);
                drop(ongoing);
                if let Some(entry) = entry {
                    entry.timeout.cancel();
                    self.finish(entry.partial);
                }
                Ok(())
            }
            Err(e) => {
                error!(version, tag, error = %e, "legacy backup aggregation invariant violated");
                if let Some(entry) = ongoing.remove(&slot) {
                    entry.timeout.cancel();
                }
                drop(ongoing);
                self.fail(key_id, version);
                Err(e.into())
            }
        }
    }

    /// Runs on the worker.
    fn complete_if_ready(&self, key_id: KeyId, version: u32) {
        let slot = (key_id, version);
        let entry = {
            let mut ongoing = self.ongoing.lock();
            match ongoing.get(&slot) {
                Some(entry) if entry.partial.is_complete() => ongoing.remove(&slot),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            entry.timeout.cancel();
            self.finish(entry.partial);
        }
    }

    /// Runs on the worker.
    fn expire(&self, key_id: KeyId, version: u32) {
        let Some(entry) = self.ongoing.lock().remove(&(key_id, version)) else {
            return;
        };
        warn!(
            version,
            missing = ?entry.partial.missing(),
            "legacy backup timed out waiting for parts"
        );
        self.fail(key_id, version);
    }

    fn finish(&self, partial: PartialBackup) {
        let key_id = *partial.key_id();
        let version = partial.version();
        let now = now_millis();
        let document = partial.into_document(now);

        let storage = self.storage.lock();
        match self.seal_ready(&storage, key_id, version, &document, now) {
            Ok(true) => info!(version, "legacy backup ready"),
            Ok(false) => debug!(version, "legacy backup was no longer ongoing"),
            Err(e) => {
                warn!(version, error = %e, "legacy backup could not be framed");
                if let Err(e) = storage.set_backup_failed(&key_id, version, now) {
                    warn!(version, error = %e, "failed to mark backup as failed");
                }
            }
        }
    }

    fn seal_ready(
        &self,
        storage: &Storage,
        key_id: KeyId,
        version: u32,
        document: &BackupDocument,
        now: u64,
    ) -> BackupResult<bool> {
        let key = storage.active_backup_key()?.ok_or(BackupError::NoActiveKey)?;
        if key.key_id != key_id {
            return Err(BackupError::InvalidState(
                "backup key replaced while the backup was ongoing".into(),
            ));
        }
        let blob =
            self.framer
                .frame_with_keys(&key.public_key, &key.mac_key, document, &mut OsRng)?;
        Ok(storage.transaction(|s| s.set_backup_ready(&key_id, version, &blob, now))?)
    }

    fn fail(&self, key_id: KeyId, version: u32) {
        match self
            .storage
            .lock()
            .set_backup_failed(&key_id, version, now_millis())
        {
            Ok(true) => info!(version, "legacy backup failed"),
            Ok(false) => {}
            Err(e) => warn!(version, error = %e, "failed to mark backup as failed"),
        }
    }
}
