// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for backup storage
//!
//! Schema migrations, key and version bookkeeping, device seeds and
//! profile backup threads, on disk and in memory.

mod common;

use rand::rngs::OsRng;
use tempfile::TempDir;
use uuid::Uuid;

use common::fixtures::{identity_id, SERVER};
use common::helpers::memory_storage;
use vauchi_backup::storage::migration::all_migrations;
use vauchi_backup::storage::{BackupKeyRecord, BackupRecord, BackupStatus};
use vauchi_backup::{
    BackupSeed, CryptoProvider, DefaultCryptoProvider, KeyId, Storage, StorageError,
    SymmetricKey, CURRENT_FORMAT_VERSION,
};

fn key_record(seed: &BackupSeed) -> BackupKeyRecord {
    let keys = DefaultCryptoProvider::new()
        .derive_keys_from_seed(seed)
        .unwrap();
    BackupKeyRecord::new(keys.key_id, keys.public_key, keys.mac_key, 1_000)
}

fn ongoing(key_id: KeyId, version: u32) -> BackupRecord {
    BackupRecord {
        key_id,
        version,
        status: BackupStatus::Ongoing,
        for_export: false,
        format_version: CURRENT_FORMAT_VERSION,
        payload: None,
        status_changed_at: 1_000,
    }
}

// ============================================================
// Schema
// ============================================================

#[test]
fn test_fresh_database_is_fully_migrated() {
    let storage = memory_storage();
    let latest = all_migrations().last().map(|m| m.version).unwrap();

    assert_eq!(storage.schema_version().unwrap(), latest);
}

#[test]
fn test_reopening_keeps_schema_and_secrets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backup.db");
    let key = SymmetricKey::generate();
    let seed = BackupSeed::generate(&mut OsRng);
    let record = key_record(&seed);

    {
        let storage = Storage::open(&path, key.clone()).unwrap();
        storage.replace_backup_key(&record).unwrap();
        storage
            .insert_device_backup_seed(&seed, SERVER, Uuid::new_v4())
            .unwrap();
    }

    let storage = Storage::open(&path, key).unwrap();
    let latest = all_migrations().last().map(|m| m.version).unwrap();
    assert_eq!(storage.schema_version().unwrap(), latest);

    let stored_key = storage.active_backup_key().unwrap().unwrap();
    assert_eq!(stored_key.key_id, record.key_id);
    assert_eq!(stored_key.public_key, record.public_key);
    assert!(stored_key.mac_key == record.mac_key);

    let stored_seed = storage.active_device_backup_seed().unwrap().unwrap();
    assert_eq!(stored_seed.seed, seed);
    assert_eq!(stored_seed.server, SERVER);
}

#[test]
fn test_secrets_do_not_open_under_another_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backup.db");
    let seed = BackupSeed::generate(&mut OsRng);

    {
        let storage = Storage::open(&path, SymmetricKey::generate()).unwrap();
        storage
            .insert_device_backup_seed(&seed, SERVER, Uuid::new_v4())
            .unwrap();
    }

    let storage = Storage::open(&path, SymmetricKey::generate()).unwrap();
    assert!(matches!(
        storage.active_device_backup_seed(),
        Err(StorageError::Encryption(_))
    ));
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let storage = memory_storage();
    let seed = BackupSeed::generate(&mut OsRng);

    let result: Result<(), StorageError> = storage.transaction(|tx| {
        tx.insert_device_backup_seed(&seed, SERVER, Uuid::new_v4())?;
        Err(StorageError::NotFound("abort".into()))
    });

    assert!(matches!(result, Err(StorageError::NotFound(_))));
    assert!(storage.active_device_backup_seed().unwrap().is_none());

    let id = storage
        .transaction(|tx| tx.insert_device_backup_seed(&seed, SERVER, Uuid::new_v4()))
        .unwrap();
    assert_eq!(storage.active_device_backup_seed().unwrap().unwrap().id, id);
}

// ============================================================
// Backup keys and versions
// ============================================================

#[test]
fn test_versions_start_at_one_and_increase() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    storage.replace_backup_key(&record).unwrap();

    assert_eq!(storage.next_backup_version(&record.key_id).unwrap(), 1);
    storage.insert_backup(&ongoing(record.key_id, 1)).unwrap();
    storage.insert_backup(&ongoing(record.key_id, 2)).unwrap();

    assert_eq!(storage.next_backup_version(&record.key_id).unwrap(), 3);
    let versions: Vec<u32> = storage
        .list_backups(&record.key_id)
        .unwrap()
        .iter()
        .map(|b| b.version)
        .collect();
    assert_eq!(versions, vec![1, 2]);
}

#[test]
fn test_replacing_key_drops_previous_backups() {
    let storage = memory_storage();
    let first = key_record(&BackupSeed::generate(&mut OsRng));
    let second = key_record(&BackupSeed::generate(&mut OsRng));

    storage.replace_backup_key(&first).unwrap();
    storage.insert_backup(&ongoing(first.key_id, 1)).unwrap();
    storage.replace_backup_key(&second).unwrap();

    assert_eq!(
        storage.active_backup_key().unwrap().unwrap().key_id,
        second.key_id
    );
    assert!(storage.list_backups(&first.key_id).unwrap().is_empty());
    assert_eq!(storage.next_backup_version(&second.key_id).unwrap(), 1);
}

#[test]
fn test_verification_is_counted() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    storage.replace_backup_key(&record).unwrap();

    assert!(storage.record_key_verification(&record.key_id, 10).unwrap());
    assert!(storage.record_key_verification(&record.key_id, 20).unwrap());

    let stored = storage.active_backup_key().unwrap().unwrap();
    assert_eq!(stored.verification_count, 2);
    assert_eq!(stored.last_verified_at, Some(20));

    let unknown = KeyId::from_bytes([0u8; 32]);
    assert!(!storage.record_key_verification(&unknown, 30).unwrap());
}

#[test]
fn test_status_transitions_only_leave_ongoing() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    let key_id = record.key_id;
    storage.replace_backup_key(&record).unwrap();
    storage.insert_backup(&ongoing(key_id, 1)).unwrap();
    storage.insert_backup(&ongoing(key_id, 2)).unwrap();

    assert!(storage.set_backup_ready(&key_id, 1, b"blob", 2_000).unwrap());
    assert!(!storage.set_backup_failed(&key_id, 1, 2_100).unwrap());
    assert!(storage.set_backup_failed(&key_id, 2, 2_200).unwrap());
    assert!(!storage.set_backup_ready(&key_id, 2, b"late", 2_300).unwrap());

    let first = storage.get_backup(&key_id, 1).unwrap().unwrap();
    assert_eq!(first.status, BackupStatus::Ready);
    assert_eq!(first.payload.as_deref(), Some(&b"blob"[..]));
    assert_eq!(first.status_changed_at, 2_000);

    let second = storage.get_backup(&key_id, 2).unwrap().unwrap();
    assert_eq!(second.status, BackupStatus::Failed);
    assert_eq!(second.payload, None);

    assert_eq!(
        storage.active_backup_key().unwrap().unwrap().latest_version,
        Some(1)
    );
}

#[test]
fn test_latest_ready_backup_skips_failed_and_ongoing() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    let key_id = record.key_id;
    storage.replace_backup_key(&record).unwrap();

    assert!(storage.latest_ready_backup(&key_id).unwrap().is_none());

    for version in 1..=4 {
        storage.insert_backup(&ongoing(key_id, version)).unwrap();
    }
    storage.set_backup_ready(&key_id, 1, b"one", 1).unwrap();
    storage.set_backup_ready(&key_id, 2, b"two", 2).unwrap();
    storage.set_backup_failed(&key_id, 3, 3).unwrap();

    let latest = storage.latest_ready_backup(&key_id).unwrap().unwrap();
    assert_eq!(latest.version, 2);

    storage.mark_backup_delivered(&key_id, 2, true, 5).unwrap();
    let latest = storage.latest_ready_backup(&key_id).unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.status, BackupStatus::UploadedOrExported);
}

#[test]
fn test_delivery_advances_the_matching_pointer() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    let key_id = record.key_id;
    storage.replace_backup_key(&record).unwrap();
    for version in 1..=3 {
        storage.insert_backup(&ongoing(key_id, version)).unwrap();
    }
    storage.set_backup_ready(&key_id, 1, b"one", 1).unwrap();
    storage.set_backup_ready(&key_id, 2, b"two", 2).unwrap();

    assert!(storage.mark_backup_delivered(&key_id, 2, true, 10).unwrap());
    assert!(storage.mark_backup_delivered(&key_id, 1, false, 11).unwrap());
    // Exporting an older version never moves the pointer back.
    assert!(storage.mark_backup_delivered(&key_id, 1, true, 12).unwrap());
    // Version 3 is still ongoing.
    assert!(!storage.mark_backup_delivered(&key_id, 3, false, 13).unwrap());

    let stored = storage.active_backup_key().unwrap().unwrap();
    assert_eq!(stored.exported_version, Some(2));
    assert_eq!(stored.uploaded_version, Some(1));
}

#[test]
fn test_status_and_key_pointer_roll_back_together() {
    let storage = memory_storage();
    let record = key_record(&BackupSeed::generate(&mut OsRng));
    let key_id = record.key_id;
    storage.replace_backup_key(&record).unwrap();
    storage.insert_backup(&ongoing(key_id, 1)).unwrap();

    let result: Result<(), StorageError> = storage.transaction(|s| {
        assert!(s.set_backup_ready(&key_id, 1, b"one", 5)?);
        Err(StorageError::NotFound("abort".into()))
    });
    assert!(result.is_err());
    let backup = storage.get_backup(&key_id, 1).unwrap().unwrap();
    assert_eq!(backup.status, BackupStatus::Ongoing);
    assert_eq!(storage.active_backup_key().unwrap().unwrap().latest_version, None);

    storage
        .transaction(|s| s.set_backup_ready(&key_id, 1, b"one", 5))
        .unwrap();
    let result: Result<(), StorageError> = storage.transaction(|s| {
        assert!(s.mark_backup_delivered(&key_id, 1, true, 6)?);
        Err(StorageError::NotFound("abort".into()))
    });
    assert!(result.is_err());
    let backup = storage.get_backup(&key_id, 1).unwrap().unwrap();
    assert_eq!(backup.status, BackupStatus::Ready);
    let key = storage.active_backup_key().unwrap().unwrap();
    assert_eq!(key.latest_version, Some(1));
    assert_eq!(key.exported_version, None);
}

// ============================================================
// Device backup seeds
// ============================================================

#[test]
fn test_new_seed_deactivates_previous_one() {
    let storage = memory_storage();
    let first = BackupSeed::generate(&mut OsRng);
    let second = BackupSeed::generate(&mut OsRng);

    let first_id = storage
        .insert_device_backup_seed(&first, SERVER, Uuid::new_v4())
        .unwrap();
    let second_id = storage
        .insert_device_backup_seed(&second, SERVER, Uuid::new_v4())
        .unwrap();

    let active = storage.active_device_backup_seed().unwrap().unwrap();
    assert_eq!(active.id, second_id);
    assert_eq!(active.seed, second);
    assert!(active.active);
    assert_eq!(active.next_backup_at, 0);

    let inactive = storage.inactive_device_backup_seeds().unwrap();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].id, first_id);
    assert_eq!(inactive[0].seed, first);
    assert!(!inactive[0].active);
}

#[test]
fn test_seed_lifecycle() {
    let storage = memory_storage();
    let seed = BackupSeed::generate(&mut OsRng);
    let thread_id = Uuid::new_v4();
    let id = storage
        .insert_device_backup_seed(&seed, SERVER, thread_id)
        .unwrap();

    assert!(storage.set_device_backup_next(id, 42_000).unwrap());
    let active = storage.active_device_backup_seed().unwrap().unwrap();
    assert_eq!(active.next_backup_at, 42_000);
    assert_eq!(active.thread_id, thread_id);

    assert!(storage.deactivate_device_backup_seed().unwrap());
    assert!(!storage.deactivate_device_backup_seed().unwrap());
    assert!(storage.active_device_backup_seed().unwrap().is_none());
    assert_eq!(storage.inactive_device_backup_seeds().unwrap().len(), 1);

    assert!(storage.delete_device_backup_seed(id).unwrap());
    assert!(!storage.delete_device_backup_seed(id).unwrap());
    assert!(storage.inactive_device_backup_seeds().unwrap().is_empty());
    assert!(!storage.set_device_backup_next(id, 1).unwrap());
}

// ============================================================
// Profile backup threads
// ============================================================

#[test]
fn test_profile_thread_is_created_once() {
    let storage = memory_storage();
    let alice = identity_id(1);

    assert!(storage.profile_backup_thread(&alice).unwrap().is_none());
    let created = storage.get_or_create_profile_backup_thread(&alice).unwrap();
    let again = storage.get_or_create_profile_backup_thread(&alice).unwrap();

    assert_eq!(created, again);
    assert_eq!(created.next_backup_at, 0);
    assert_eq!(
        storage.profile_backup_thread(&alice).unwrap(),
        Some(created)
    );
}

#[test]
fn test_profile_threads_listing_and_deletion() {
    let storage = memory_storage();
    let alice = identity_id(1);
    let bob = identity_id(2);

    let bob_thread = storage.get_or_create_profile_backup_thread(&bob).unwrap();
    let alice_thread = storage.get_or_create_profile_backup_thread(&alice).unwrap();
    assert_ne!(alice_thread.thread_id, bob_thread.thread_id);

    assert!(storage.set_profile_backup_next(&alice, 7_000).unwrap());
    assert!(!storage
        .set_profile_backup_next(&identity_id(3), 1)
        .unwrap());

    let threads = storage.profile_backup_threads().unwrap();
    let identities: Vec<_> = threads.iter().map(|t| t.identity.clone()).collect();
    assert_eq!(identities, vec![alice.clone(), bob.clone()]);
    assert_eq!(threads[0].next_backup_at, 7_000);

    assert!(storage.delete_profile_backup_thread(&alice).unwrap());
    assert!(!storage.delete_profile_backup_thread(&alice).unwrap());
    assert_eq!(storage.profile_backup_threads().unwrap().len(), 1);
}
