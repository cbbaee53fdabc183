// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for legacy multi-delegate backups
//!
//! Key lifecycle, aggregation of delegate parts into versions, timeouts and
//! restore.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;

use common::helpers::{
    fast_config, init_tracing, memory_storage, wait_until, LegacyMode, TestLegacyDelegate,
};
use vauchi_backup::storage::BackupStatus;
use vauchi_backup::{
    AggregationError, BackupError, BackupFramer, BackupService, BackupSeed,
    DefaultCryptoProvider, FramingError, LegacyBackupDelegate, MemoryIdentityStore,
    MockTransport, SeedStatus, SnapshotError,
};

/// A service whose ongoing backups never time out during a test.
fn service_with(delegates: &[&Arc<TestLegacyDelegate>]) -> BackupService {
    service_with_timeout(delegates, Duration::from_secs(60))
}

fn service_with_timeout(
    delegates: &[&Arc<TestLegacyDelegate>],
    ongoing_timeout: Duration,
) -> BackupService {
    init_tracing();
    let mut builder = BackupService::builder()
        .config(fast_config().with_ongoing_backup_timeout(ongoing_timeout))
        .storage(memory_storage())
        .transport(Arc::new(MockTransport::new()))
        .identities(Arc::new(MemoryIdentityStore::new()));
    for delegate in delegates {
        builder = builder.legacy_delegate(Arc::clone(*delegate) as Arc<dyn LegacyBackupDelegate>);
    }
    builder.build().unwrap()
}

fn status(service: &BackupService, version: u32) -> Option<BackupStatus> {
    service
        .legacy()
        .backup(version)
        .unwrap()
        .map(|record| record.status)
}

fn framer() -> BackupFramer {
    BackupFramer::new(Arc::new(DefaultCryptoProvider::new()))
}

// ============================================================
// Aggregation
// ============================================================

#[test]
fn test_version_is_ready_only_after_every_part() {
    let settings = TestLegacyDelegate::new("settings", LegacyMode::Immediate(b"S".to_vec()));
    let messages = TestLegacyDelegate::new("messages", LegacyMode::Manual);
    let service = service_with(&[&settings, &messages]);
    let seed = service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let version = service.legacy().initiate_backup(false).unwrap();

    assert_eq!(version, 1);
    assert_eq!(status(&service, 1), Some(BackupStatus::Ongoing));
    assert_eq!(service.legacy().ongoing_versions(), vec![1]);
    assert!(service.legacy().latest_backup().unwrap().is_none());

    let request = messages.take_request().unwrap();
    let key = service.legacy().active_key().unwrap().unwrap();
    assert_eq!(request.key_id, key.key_id);
    assert_eq!(request.version, 1);
    assert!(!request.for_export);
    request.reporter.success(b"M".to_vec()).unwrap();

    assert_eq!(status(&service, 1), Some(BackupStatus::Ready));
    assert!(service.legacy().ongoing_versions().is_empty());

    let record = service.legacy().latest_backup().unwrap().unwrap();
    let document = framer().unframe(&seed, &record.payload.unwrap()).unwrap();
    assert_eq!(document.part("settings"), Some(&b"S"[..]));
    assert_eq!(document.part("messages"), Some(&b"M"[..]));
    assert_eq!(
        service.legacy().active_key().unwrap().unwrap().latest_version,
        Some(1)
    );
}

#[test]
fn test_parts_reported_from_other_threads() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Threaded(vec![1]));
    let b = TestLegacyDelegate::new("b", LegacyMode::Threaded(vec![2]));
    let service = service_with(&[&a, &b]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let version = service.legacy().initiate_backup(true).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        status(&service, version) == Some(BackupStatus::Ready)
    }));
    assert!(service.legacy().backup(version).unwrap().unwrap().for_export);
}

#[test]
fn test_versions_increase() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Immediate(vec![1]));
    let service = service_with(&[&a]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();

    assert_eq!(service.legacy().initiate_backup(false).unwrap(), 1);
    assert_eq!(service.legacy().initiate_backup(false).unwrap(), 2);
    assert_eq!(service.legacy().latest_backup().unwrap().unwrap().version, 2);
}

#[test]
fn test_no_delegates_completes_immediately() {
    let service = service_with(&[]);
    let seed = service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let version = service.legacy().initiate_backup(false).unwrap();

    assert_eq!(status(&service, version), Some(BackupStatus::Ready));
    let payload = service.legacy().backup(version).unwrap().unwrap().payload.unwrap();
    assert_eq!(framer().unframe(&seed, &payload).unwrap().parts().len(), 0);
}

#[test]
fn test_duplicate_report_fails_version() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let b = TestLegacyDelegate::new("b", LegacyMode::Manual);
    let service = service_with(&[&a, &b]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let version = service.legacy().initiate_backup(false).unwrap();

    let request_a = a.take_request().unwrap();
    request_a.reporter.success(vec![1]).unwrap();
    let duplicate = request_a.reporter.success(vec![1]);

    assert!(matches!(
        duplicate,
        Err(BackupError::Aggregation(AggregationError::DuplicateTag {
            ref tag,
            version: 1,
        })) if tag == "a"
    ));
    assert_eq!(status(&service, version), Some(BackupStatus::Failed));

    // The remaining delegate reports into a version that is gone.
    let late = b.take_request().unwrap().reporter.success(vec![2]);
    assert!(matches!(late, Err(BackupError::InvalidState(_))));
    assert_eq!(status(&service, version), Some(BackupStatus::Failed));
}

#[test]
fn test_failure_report_fails_version() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let b = TestLegacyDelegate::new("b", LegacyMode::Fail);
    let service = service_with(&[&a, &b]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let version = service.legacy().initiate_backup(false).unwrap();

    assert_eq!(status(&service, version), Some(BackupStatus::Failed));
    assert!(service.legacy().ongoing_versions().is_empty());
    assert!(service.legacy().latest_backup().unwrap().is_none());
}

#[test]
fn test_missing_part_times_out() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Immediate(vec![1]));
    let b = TestLegacyDelegate::new("b", LegacyMode::Manual);
    let service = service_with_timeout(&[&a, &b], Duration::from_millis(200));
    service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let version = service.legacy().initiate_backup(false).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        status(&service, version) == Some(BackupStatus::Failed)
    }));
    assert!(service.legacy().ongoing_versions().is_empty());

    let late = b.take_request().unwrap().reporter.success(vec![2]);
    assert!(matches!(late, Err(BackupError::InvalidState(_))));
}

#[test]
fn test_initiate_without_key_fails() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let service = service_with(&[&a]);

    assert!(matches!(
        service.legacy().initiate_backup(false),
        Err(BackupError::NoActiveKey)
    ));
    assert!(a.take_request().is_none());
}

// ============================================================
// Keys
// ============================================================

#[test]
fn test_verify_backup_seed() {
    let service = service_with(&[]);
    assert!(matches!(
        service.legacy().verify_backup_seed("0000"),
        Ok(SeedStatus::SeedTooShort)
    ));
    assert!(matches!(
        service.legacy().verify_backup_seed(&BackupSeed::generate(&mut OsRng).to_string()),
        Err(BackupError::NoActiveKey)
    ));

    let seed = service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let other = BackupSeed::generate(&mut OsRng);

    assert_eq!(
        service.legacy().verify_backup_seed(&seed.to_string()).unwrap(),
        SeedStatus::Success
    );
    assert_eq!(
        service
            .legacy()
            .verify_backup_seed(&seed.to_compact_string().to_lowercase())
            .unwrap(),
        SeedStatus::Success
    );
    assert_eq!(
        service.legacy().verify_backup_seed(&other.to_string()).unwrap(),
        SeedStatus::BadKey
    );
    assert_eq!(
        service
            .legacy()
            .verify_backup_seed(&format!("{} 0", seed))
            .unwrap(),
        SeedStatus::SeedTooLong
    );

    let key = service.legacy().active_key().unwrap().unwrap();
    assert_eq!(key.verification_count, 2);
    assert!(key.last_verified_at.is_some());
}

#[test]
fn test_new_key_replaces_old_one() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let service = service_with(&[&a]);
    let first = service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let first_key = service.legacy().active_key().unwrap().unwrap().key_id;
    service.legacy().initiate_backup(false).unwrap();
    let stale = a.take_request().unwrap();

    let second = service.legacy().generate_backup_key(&mut OsRng).unwrap();

    let second_key = service.legacy().active_key().unwrap().unwrap().key_id;
    assert_ne!(first_key, second_key);
    assert!(service.legacy().ongoing_versions().is_empty());
    assert!(service.legacy().backup(1).unwrap().is_none());
    assert_eq!(
        service.legacy().verify_backup_seed(&first.to_string()).unwrap(),
        SeedStatus::BadKey
    );
    assert_eq!(
        service.legacy().verify_backup_seed(&second.to_string()).unwrap(),
        SeedStatus::Success
    );
    assert!(matches!(
        stale.reporter.success(vec![1]),
        Err(BackupError::InvalidState(_))
    ));
    // Versions restart under the new key.
    assert_eq!(service.legacy().initiate_backup(false).unwrap(), 1);
}

// ============================================================
// Delivery
// ============================================================

#[test]
fn test_mark_exported_and_uploaded() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Immediate(vec![1]));
    let service = service_with(&[&a]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let version = service.legacy().initiate_backup(true).unwrap();

    assert!(service.legacy().mark_backup_exported(version).unwrap());
    assert_eq!(status(&service, version), Some(BackupStatus::UploadedOrExported));
    assert!(service.legacy().mark_backup_uploaded(version).unwrap());

    let key = service.legacy().active_key().unwrap().unwrap();
    assert_eq!(key.exported_version, Some(version));
    assert_eq!(key.uploaded_version, Some(version));
    // A delivered version is still the latest usable one.
    assert_eq!(
        service.legacy().latest_backup().unwrap().unwrap().version,
        version
    );
}

#[test]
fn test_cannot_deliver_unfinished_version() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let service = service_with(&[&a]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let version = service.legacy().initiate_backup(false).unwrap();

    assert!(!service.legacy().mark_backup_uploaded(version).unwrap());
    assert!(!service.legacy().mark_backup_exported(99).unwrap());
    assert_eq!(
        service.legacy().active_key().unwrap().unwrap().uploaded_version,
        None
    );
}

// ============================================================
// Restore
// ============================================================

fn ready_blob() -> (BackupSeed, Vec<u8>) {
    let a = TestLegacyDelegate::new("a", LegacyMode::Immediate(b"alpha".to_vec()));
    let b = TestLegacyDelegate::new("b", LegacyMode::Immediate(b"beta".to_vec()));
    let service = service_with(&[&a, &b]);
    let seed = service.legacy().generate_backup_key(&mut OsRng).unwrap();
    let version = service.legacy().initiate_backup(true).unwrap();
    let payload = service
        .legacy()
        .backup(version)
        .unwrap()
        .unwrap()
        .payload
        .unwrap();
    (seed, payload)
}

#[test]
fn test_restore_hands_each_delegate_its_part() {
    let (seed, blob) = ready_blob();
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let b = TestLegacyDelegate::new("b", LegacyMode::Manual);
    let service = service_with(&[&a, &b]);

    service
        .legacy()
        .restore_legacy_backup(&seed.to_string(), &blob)
        .unwrap();

    assert_eq!(*a.restored.lock(), vec![b"alpha".to_vec()]);
    assert_eq!(*b.restored.lock(), vec![b"beta".to_vec()]);
}

#[test]
fn test_restore_with_missing_part_touches_nothing() {
    let (seed, blob) = ready_blob();
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let c = TestLegacyDelegate::new("c", LegacyMode::Manual);
    let service = service_with(&[&a, &c]);

    let result = service
        .legacy()
        .restore_legacy_backup(&seed.to_string(), &blob);

    assert!(matches!(
        result,
        Err(BackupError::Snapshot(SnapshotError::MissingDelegatePart(ref tag))) if tag == "c"
    ));
    assert!(a.restored.lock().is_empty());
}

#[test]
fn test_restore_with_wrong_seed_fails() {
    let (_, blob) = ready_blob();
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let service = service_with(&[&a]);

    let result = service
        .legacy()
        .restore_legacy_backup(&BackupSeed::generate(&mut OsRng).to_string(), &blob);

    assert!(matches!(
        result,
        Err(BackupError::Framing(FramingError::MacMismatch))
    ));
    assert!(a.restored.lock().is_empty());
}

// ============================================================
// Automatic backups
// ============================================================

#[test]
fn test_content_changes_are_debounced() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Immediate(vec![1]));
    let service = service_with(&[&a]);
    service.legacy().generate_backup_key(&mut OsRng).unwrap();

    for _ in 0..5 {
        service.legacy().on_content_changed();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        status(&service, 1) == Some(BackupStatus::Ready)
    }));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(status(&service, 2), None);
}

#[test]
fn test_content_change_without_key_is_skipped() {
    let a = TestLegacyDelegate::new("a", LegacyMode::Manual);
    let service = service_with(&[&a]);

    service.legacy().on_content_changed();
    std::thread::sleep(Duration::from_millis(200));

    assert!(a.take_request().is_none());
}

#[test]
fn test_duplicate_legacy_tags_are_rejected() {
    init_tracing();
    let first: Arc<dyn LegacyBackupDelegate> =
        TestLegacyDelegate::new("a", LegacyMode::Manual);
    let second: Arc<dyn LegacyBackupDelegate> =
        TestLegacyDelegate::new("a", LegacyMode::Manual);

    let result = BackupService::builder()
        .storage(memory_storage())
        .transport(Arc::new(MockTransport::new()))
        .identities(Arc::new(MemoryIdentityStore::new()))
        .legacy_delegate(first)
        .legacy_delegate(second)
        .build();

    assert!(matches!(
        result,
        Err(BackupError::Snapshot(SnapshotError::DuplicateDelegate(_)))
    ));
}
