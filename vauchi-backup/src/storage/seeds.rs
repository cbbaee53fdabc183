// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device backup seed and profile thread storage operations.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;
use zeroize::Zeroize;

use super::{Storage, StorageError};
use crate::crypto::{BackupSeed, SEED_BYTES};
use crate::model::IdentityId;

/// A device backup seed. Inactive seeds only live until their backups are
/// deleted server-side.
#[derive(Debug, Clone)]
pub struct DeviceBackupSeedRecord {
    pub id: i64,
    pub seed: BackupSeed,
    pub server: String,
    pub active: bool,
    /// When the next device backup is due (ms), 0 for "as soon as possible".
    pub next_backup_at: u64,
    /// Thread under which device backups are stored server-side.
    pub thread_id: Uuid,
}

/// Server-side thread holding the profile backups of one owned identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileBackupThread {
    pub identity: IdentityId,
    pub thread_id: Uuid,
    pub next_backup_at: u64,
}

type RawSeedRow = (i64, Vec<u8>, String, bool, i64, Vec<u8>);

fn raw_seed_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSeedRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn uuid_from_blob(bytes: &[u8]) -> Result<Uuid, StorageError> {
    Uuid::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

const SEED_COLUMNS: &str = "id, seed_encrypted, server, active, next_backup_at, thread_id";

impl Storage {
    // === Device Backup Seed Operations ===

    /// Stores `seed` as the active seed; any previously active seed becomes
    /// inactive. Returns the new row id.
    pub fn insert_device_backup_seed(
        &self,
        seed: &BackupSeed,
        server: &str,
        thread_id: Uuid,
    ) -> Result<i64, StorageError> {
        let sealed = self.seal(seed.as_bytes())?;
        self.conn
            .execute("UPDATE device_backup_seeds SET active = 0 WHERE active = 1", [])?;
        self.conn.execute(
            "INSERT INTO device_backup_seeds
                 (seed_encrypted, server, active, next_backup_at, thread_id)
             VALUES (?1, ?2, 1, 0, ?3)",
            params![sealed, server, thread_id.as_bytes().as_slice()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn active_device_backup_seed(
        &self,
    ) -> Result<Option<DeviceBackupSeedRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM device_backup_seeds WHERE active = 1",
                    SEED_COLUMNS
                ),
                [],
                raw_seed_row,
            )
            .optional()?;
        raw.map(|r| self.seed_from_raw(r)).transpose()
    }

    pub fn inactive_device_backup_seeds(
        &self,
    ) -> Result<Vec<DeviceBackupSeedRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM device_backup_seeds WHERE active = 0 ORDER BY id",
            SEED_COLUMNS
        ))?;
        let rows = stmt.query_map([], raw_seed_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| self.seed_from_raw(r))
            .collect()
    }

    /// Marks the active seed inactive. Returns whether there was one.
    pub fn deactivate_device_backup_seed(&self) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .execute("UPDATE device_backup_seeds SET active = 0 WHERE active = 1", [])?;
        Ok(rows > 0)
    }

    pub fn delete_device_backup_seed(&self, id: i64) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .execute("DELETE FROM device_backup_seeds WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Sets when the next device backup of seed `id` is due.
    pub fn set_device_backup_next(
        &self,
        id: i64,
        next_backup_at: u64,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE device_backup_seeds SET next_backup_at = ?1 WHERE id = ?2",
            params![next_backup_at as i64, id],
        )?;
        Ok(rows > 0)
    }

    fn seed_from_raw(&self, raw: RawSeedRow) -> Result<DeviceBackupSeedRecord, StorageError> {
        let (id, sealed, server, active, next_backup_at, thread_id) = raw;
        let mut bytes = self.open_sealed(&sealed)?;
        let seed_bytes: Result<[u8; SEED_BYTES], _> = bytes.as_slice().try_into();
        bytes.zeroize();
        let mut seed_bytes =
            seed_bytes.map_err(|_| StorageError::Serialization("invalid seed length".into()))?;
        let seed = BackupSeed::from_bytes(seed_bytes);
        seed_bytes.zeroize();

        Ok(DeviceBackupSeedRecord {
            id,
            seed,
            server,
            active,
            next_backup_at: next_backup_at as u64,
            thread_id: uuid_from_blob(&thread_id)?,
        })
    }

    // === Profile Backup Thread Operations ===

    pub fn profile_backup_thread(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<ProfileBackupThread>, StorageError> {
        let raw: Option<(Vec<u8>, i64)> = self
            .conn
            .query_row(
                "SELECT thread_id, next_backup_at FROM profile_backup_threads
                 WHERE identity_id = ?1",
                params![identity.as_bytes()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        raw.map(|(thread_id, next_backup_at)| {
            Ok(ProfileBackupThread {
                identity: identity.clone(),
                thread_id: uuid_from_blob(&thread_id)?,
                next_backup_at: next_backup_at as u64,
            })
        })
        .transpose()
    }

    /// Returns the identity's thread, creating it due immediately if missing.
    pub fn get_or_create_profile_backup_thread(
        &self,
        identity: &IdentityId,
    ) -> Result<ProfileBackupThread, StorageError> {
        if let Some(thread) = self.profile_backup_thread(identity)? {
            return Ok(thread);
        }
        let thread = ProfileBackupThread {
            identity: identity.clone(),
            thread_id: Uuid::new_v4(),
            next_backup_at: 0,
        };
        self.conn.execute(
            "INSERT INTO profile_backup_threads (identity_id, thread_id, next_backup_at)
             VALUES (?1, ?2, 0)",
            params![identity.as_bytes(), thread.thread_id.as_bytes().as_slice()],
        )?;
        Ok(thread)
    }

    pub fn profile_backup_threads(&self) -> Result<Vec<ProfileBackupThread>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_id, thread_id, next_backup_at FROM profile_backup_threads
             ORDER BY identity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(identity, thread_id, next_backup_at)| {
                Ok(ProfileBackupThread {
                    identity: IdentityId::new(identity),
                    thread_id: uuid_from_blob(&thread_id)?,
                    next_backup_at: next_backup_at as u64,
                })
            })
            .collect()
    }

    pub fn set_profile_backup_next(
        &self,
        identity: &IdentityId,
        next_backup_at: u64,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE profile_backup_threads SET next_backup_at = ?1 WHERE identity_id = ?2",
            params![next_backup_at as i64, identity.as_bytes()],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_profile_backup_thread(
        &self,
        identity: &IdentityId,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "DELETE FROM profile_backup_threads WHERE identity_id = ?1",
            params![identity.as_bytes()],
        )?;
        Ok(rows > 0)
    }
}
