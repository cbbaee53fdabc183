// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test Helpers
//!
//! In-memory delegates that record what happens to them, plus setup
//! shortcuts for storage and the backup service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use vauchi_backup::snapshot::OpaqueSnapshot;
use vauchi_backup::{
    BackupConfig, BackupService, DelegateSnapshot, IdentityId, IdentityStore,
    LegacyBackupDelegate, LegacyBackupRequest, MockTransport, RestoreToken, SnapshotDelegate,
    SnapshotError, Storage, SymmetricKey,
};

/// Installs a log subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn memory_storage() -> Storage {
    Storage::in_memory(SymmetricKey::generate()).unwrap()
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Shared, ordered record of token and restore events.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Token writing `commit:<name>` or `rollback:<name>` to the log.
pub struct RecordingToken {
    pub name: String,
    pub log: EventLog,
}

impl RestoreToken for RecordingToken {
    fn commit(self: Box<Self>) {
        self.log.lock().push(format!("commit:{}", self.name));
    }

    fn rollback(self: Box<Self>) {
        self.log.lock().push(format!("rollback:{}", self.name));
    }
}

/// Snapshot delegate contributing one opaque JSON value.
pub struct OpaqueDelegate {
    pub tag: String,
    pub content: Mutex<Value>,
    pub fail_restore: bool,
    pub log: EventLog,
}

impl OpaqueDelegate {
    pub fn new(tag: &str, content: Value, log: &EventLog) -> Arc<Self> {
        Arc::new(OpaqueDelegate {
            tag: tag.to_string(),
            content: Mutex::new(content),
            fail_restore: false,
            log: Arc::clone(log),
        })
    }

    pub fn failing(tag: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(OpaqueDelegate {
            tag: tag.to_string(),
            content: Mutex::new(Value::Null),
            fail_restore: true,
            log: Arc::clone(log),
        })
    }

    fn stage(
        &self,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError> {
        snapshot.as_opaque()?;
        if self.fail_restore {
            self.log.lock().push(format!("failed:{}", self.tag));
            return Err(SnapshotError::Delegate {
                tag: self.tag.clone(),
                reason: "restore refused".to_string(),
            });
        }
        self.log.lock().push(format!("staged:{}", self.tag));
        Ok(Some(Box::new(RecordingToken {
            name: self.tag.clone(),
            log: Arc::clone(&self.log),
        })))
    }
}

impl SnapshotDelegate for OpaqueDelegate {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn get_sync_snapshot(
        &self,
        _identity: Option<&IdentityId>,
    ) -> Result<DelegateSnapshot, SnapshotError> {
        Ok(DelegateSnapshot::Opaque(OpaqueSnapshot::new(
            self.content.lock().clone(),
        )))
    }

    fn restore_owned_identity(
        &self,
        _identity: &IdentityId,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError> {
        self.stage(snapshot)
    }

    fn restore_sync_snapshot(
        &self,
        snapshot: &DelegateSnapshot,
    ) -> Result<Option<Box<dyn RestoreToken>>, SnapshotError> {
        self.stage(snapshot)
    }
}

/// How a [`TestLegacyDelegate`] answers a backup request.
#[derive(Debug, Clone)]
pub enum LegacyMode {
    /// Reports the part before returning.
    Immediate(Vec<u8>),
    /// Reports the part from a spawned thread.
    Threaded(Vec<u8>),
    /// Keeps the request; the test reports.
    Manual,
    /// Reports a failure.
    Fail,
}

pub struct TestLegacyDelegate {
    pub tag: String,
    pub mode: LegacyMode,
    pub requests: Mutex<Vec<LegacyBackupRequest>>,
    pub restored: Mutex<Vec<Vec<u8>>>,
}

impl TestLegacyDelegate {
    pub fn new(tag: &str, mode: LegacyMode) -> Arc<Self> {
        Arc::new(TestLegacyDelegate {
            tag: tag.to_string(),
            mode,
            requests: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
        })
    }

    /// Removes and returns the oldest unanswered request.
    pub fn take_request(&self) -> Option<LegacyBackupRequest> {
        let mut requests = self.requests.lock();
        if requests.is_empty() {
            None
        } else {
            Some(requests.remove(0))
        }
    }
}

impl LegacyBackupDelegate for TestLegacyDelegate {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn initiate_backup(&self, request: LegacyBackupRequest) {
        match &self.mode {
            LegacyMode::Immediate(part) => {
                request.reporter.success(part.clone()).unwrap();
            }
            LegacyMode::Threaded(part) => {
                let part = part.clone();
                std::thread::spawn(move || {
                    let _ = request.reporter.success(part);
                });
            }
            LegacyMode::Manual => self.requests.lock().push(request),
            LegacyMode::Fail => {
                request.reporter.failure("subsystem unavailable").unwrap();
            }
        }
    }

    fn restore_backup(&self, part: &[u8]) -> Result<(), String> {
        self.restored.lock().push(part.to_vec());
        Ok(())
    }
}

/// Short delays so timers fire within a test.
pub fn fast_config() -> BackupConfig {
    BackupConfig::default()
        .with_retry_base_delay(Duration::from_millis(50))
        .with_ongoing_backup_timeout(Duration::from_millis(200))
        .with_cleanup_retry_delay(Duration::from_millis(100))
        .with_content_change_debounce(Duration::from_millis(50))
}

/// A service over in-memory storage and a mock transport.
pub fn build_service(
    identities: Arc<dyn IdentityStore>,
    transport: Arc<MockTransport>,
    legacy: Vec<Arc<dyn LegacyBackupDelegate>>,
) -> BackupService {
    let mut builder = BackupService::builder()
        .config(fast_config())
        .storage(memory_storage())
        .transport(transport)
        .identities(identities);
    for delegate in legacy {
        builder = builder.legacy_delegate(delegate);
    }
    builder.build().unwrap()
}
