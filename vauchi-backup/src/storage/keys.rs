// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Legacy backup key and backup version storage operations.

use rusqlite::{params, OptionalExtension};
use zeroize::Zeroize;

use super::{Storage, StorageError};
use crate::crypto::{EncryptionPublicKey, KeyId, MacKey};

/// Lifecycle of one legacy backup version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupStatus {
    Ongoing,
    Ready,
    /// Terminal; a retry allocates a new version.
    Failed,
    UploadedOrExported,
}

impl BackupStatus {
    fn as_i64(self) -> i64 {
        match self {
            BackupStatus::Ongoing => 0,
            BackupStatus::Ready => 1,
            BackupStatus::Failed => 2,
            BackupStatus::UploadedOrExported => 3,
        }
    }

    fn from_i64(value: i64) -> Result<Self, StorageError> {
        match value {
            0 => Ok(BackupStatus::Ongoing),
            1 => Ok(BackupStatus::Ready),
            2 => Ok(BackupStatus::Failed),
            3 => Ok(BackupStatus::UploadedOrExported),
            other => Err(StorageError::Serialization(format!(
                "unknown backup status {}",
                other
            ))),
        }
    }
}

/// The active legacy backup key. The seed itself is never stored.
#[derive(Debug, Clone)]
pub struct BackupKeyRecord {
    pub key_id: KeyId,
    pub public_key: EncryptionPublicKey,
    pub mac_key: MacKey,
    pub generated_at: u64,
    pub verification_count: u32,
    pub last_verified_at: Option<u64>,
    pub latest_version: Option<u32>,
    pub exported_version: Option<u32>,
    pub uploaded_version: Option<u32>,
}

impl BackupKeyRecord {
    pub fn new(
        key_id: KeyId,
        public_key: EncryptionPublicKey,
        mac_key: MacKey,
        generated_at: u64,
    ) -> Self {
        BackupKeyRecord {
            key_id,
            public_key,
            mac_key,
            generated_at,
            verification_count: 0,
            last_verified_at: None,
            latest_version: None,
            exported_version: None,
            uploaded_version: None,
        }
    }
}

/// One legacy backup version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub key_id: KeyId,
    pub version: u32,
    pub status: BackupStatus,
    pub for_export: bool,
    pub format_version: u32,
    /// Framed blob, present once READY.
    pub payload: Option<Vec<u8>>,
    pub status_changed_at: u64,
}

const KEY_COLUMNS: &str = "key_id, public_key, mac_key_encrypted, generated_at, verification_count,
     last_verified_at, latest_version, exported_version, uploaded_version";

const BACKUP_COLUMNS: &str =
    "key_id, version, status, for_export, format_version, payload, status_changed_at";

impl Storage {
    // === Backup Key Operations ===

    /// Replaces every backup key, and every backup made with one, by `record`.
    pub fn replace_backup_key(&self, record: &BackupKeyRecord) -> Result<(), StorageError> {
        let mac_key = self.seal(record.mac_key.as_bytes())?;

        self.conn.execute("DELETE FROM backups", [])?;
        self.conn.execute("DELETE FROM backup_keys", [])?;
        self.conn.execute(
            &format!(
                "INSERT INTO backup_keys ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                KEY_COLUMNS
            ),
            params![
                record.key_id.as_bytes().as_slice(),
                record.public_key.as_bytes().as_slice(),
                mac_key,
                record.generated_at as i64,
                record.verification_count as i64,
                record.last_verified_at.map(|t| t as i64),
                record.latest_version.map(i64::from),
                record.exported_version.map(i64::from),
                record.uploaded_version.map(i64::from),
            ],
        )?;
        Ok(())
    }

    /// The single active backup key. More than one row is an invariant
    /// violation and is reported rather than repaired.
    pub fn active_backup_key(&self) -> Result<Option<BackupKeyRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM backup_keys", KEY_COLUMNS))?;
        let rows = stmt.query_map([], |row| {
            Ok(RawKeyRow {
                key_id: row.get(0)?,
                public_key: row.get(1)?,
                mac_key_encrypted: row.get(2)?,
                generated_at: row.get(3)?,
                verification_count: row.get(4)?,
                last_verified_at: row.get(5)?,
                latest_version: row.get(6)?,
                exported_version: row.get(7)?,
                uploaded_version: row.get(8)?,
            })
        })?;
        let raw: Vec<RawKeyRow> = rows.collect::<Result<_, _>>()?;

        match raw.len() {
            0 => Ok(None),
            1 => raw
                .into_iter()
                .next()
                .map(|row| self.key_from_raw(row))
                .transpose(),
            n => Err(StorageError::Invariant(format!(
                "{} active backup keys",
                n
            ))),
        }
    }

    fn key_from_raw(&self, row: RawKeyRow) -> Result<BackupKeyRecord, StorageError> {
        let key_id = KeyId::from_slice(&row.key_id)
            .ok_or_else(|| StorageError::Serialization("invalid key id".into()))?;
        let public_key = EncryptionPublicKey::from_slice(&row.public_key)
            .ok_or_else(|| StorageError::Serialization("invalid public key".into()))?;
        let mut mac_bytes = self.open_sealed(&row.mac_key_encrypted)?;
        let mac_key = MacKey::from_slice(&mac_bytes)
            .ok_or_else(|| StorageError::Serialization("invalid MAC key".into()));
        mac_bytes.zeroize();

        Ok(BackupKeyRecord {
            key_id,
            public_key,
            mac_key: mac_key?,
            generated_at: row.generated_at as u64,
            verification_count: row.verification_count as u32,
            last_verified_at: row.last_verified_at.map(|t| t as u64),
            latest_version: row.latest_version.map(|v| v as u32),
            exported_version: row.exported_version.map(|v| v as u32),
            uploaded_version: row.uploaded_version.map(|v| v as u32),
        })
    }

    /// Counts one more successful seed verification.
    pub fn record_key_verification(&self, key_id: &KeyId, at: u64) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE backup_keys SET verification_count = verification_count + 1,
             last_verified_at = ?1 WHERE key_id = ?2",
            params![at as i64, key_id.as_bytes().as_slice()],
        )?;
        Ok(rows > 0)
    }

    // === Backup Version Operations ===

    /// The next unused version for `key_id`, starting at 1.
    pub fn next_backup_version(&self, key_id: &KeyId) -> Result<u32, StorageError> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(version) FROM backups WHERE key_id = ?1",
            params![key_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(max.map(|v| v as u32 + 1).unwrap_or(1))
    }

    pub fn insert_backup(&self, record: &BackupRecord) -> Result<(), StorageError> {
        self.conn.execute(
            &format!(
                "INSERT INTO backups ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                BACKUP_COLUMNS
            ),
            params![
                record.key_id.as_bytes().as_slice(),
                record.version as i64,
                record.status.as_i64(),
                record.for_export,
                record.format_version as i64,
                record.payload,
                record.status_changed_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_backup(
        &self,
        key_id: &KeyId,
        version: u32,
    ) -> Result<Option<BackupRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM backups WHERE key_id = ?1 AND version = ?2",
                    BACKUP_COLUMNS
                ),
                params![key_id.as_bytes().as_slice(), version as i64],
                raw_backup_row,
            )
            .optional()?;
        raw.map(backup_from_raw).transpose()
    }

    /// All versions of `key_id`, oldest first.
    pub fn list_backups(&self, key_id: &KeyId) -> Result<Vec<BackupRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM backups WHERE key_id = ?1 ORDER BY version",
            BACKUP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![key_id.as_bytes().as_slice()], raw_backup_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(backup_from_raw)
            .collect()
    }

    /// ONGOING -> READY with the framed payload. Returns false when the
    /// version is no longer ongoing.
    pub fn set_backup_ready(
        &self,
        key_id: &KeyId,
        version: u32,
        payload: &[u8],
        at: u64,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE backups SET status = ?1, payload = ?2, status_changed_at = ?3
             WHERE key_id = ?4 AND version = ?5 AND status = ?6",
            params![
                BackupStatus::Ready.as_i64(),
                payload,
                at as i64,
                key_id.as_bytes().as_slice(),
                version as i64,
                BackupStatus::Ongoing.as_i64(),
            ],
        )?;
        if rows > 0 {
            self.conn.execute(
                "UPDATE backup_keys SET latest_version = ?1 WHERE key_id = ?2",
                params![version as i64, key_id.as_bytes().as_slice()],
            )?;
        }
        Ok(rows > 0)
    }

    /// ONGOING -> FAILED. Returns false when the version is no longer ongoing.
    pub fn set_backup_failed(
        &self,
        key_id: &KeyId,
        version: u32,
        at: u64,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE backups SET status = ?1, status_changed_at = ?2
             WHERE key_id = ?3 AND version = ?4 AND status = ?5",
            params![
                BackupStatus::Failed.as_i64(),
                at as i64,
                key_id.as_bytes().as_slice(),
                version as i64,
                BackupStatus::Ongoing.as_i64(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// READY -> UPLOADED_OR_EXPORTED, advancing the key's exported or
    /// uploaded pointer.
    pub fn mark_backup_delivered(
        &self,
        key_id: &KeyId,
        version: u32,
        exported: bool,
        at: u64,
    ) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE backups SET status = ?1, status_changed_at = ?2
             WHERE key_id = ?3 AND version = ?4 AND status IN (?5, ?1)",
            params![
                BackupStatus::UploadedOrExported.as_i64(),
                at as i64,
                key_id.as_bytes().as_slice(),
                version as i64,
                BackupStatus::Ready.as_i64(),
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }
        let column = if exported {
            "exported_version"
        } else {
            "uploaded_version"
        };
        self.conn.execute(
            &format!(
                "UPDATE backup_keys SET {0} = MAX(COALESCE({0}, 0), ?1) WHERE key_id = ?2",
                column
            ),
            params![version as i64, key_id.as_bytes().as_slice()],
        )?;
        Ok(true)
    }

    /// Newest READY or delivered version of `key_id`.
    pub fn latest_ready_backup(
        &self,
        key_id: &KeyId,
    ) -> Result<Option<BackupRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM backups WHERE key_id = ?1 AND status IN (?2, ?3)
                     ORDER BY version DESC LIMIT 1",
                    BACKUP_COLUMNS
                ),
                params![
                    key_id.as_bytes().as_slice(),
                    BackupStatus::Ready.as_i64(),
                    BackupStatus::UploadedOrExported.as_i64(),
                ],
                raw_backup_row,
            )
            .optional()?;
        raw.map(backup_from_raw).transpose()
    }
}

struct RawKeyRow {
    key_id: Vec<u8>,
    public_key: Vec<u8>,
    mac_key_encrypted: Vec<u8>,
    generated_at: i64,
    verification_count: i64,
    last_verified_at: Option<i64>,
    latest_version: Option<i64>,
    exported_version: Option<i64>,
    uploaded_version: Option<i64>,
}

type RawBackupRow = (Vec<u8>, i64, i64, bool, i64, Option<Vec<u8>>, i64);

fn raw_backup_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBackupRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn backup_from_raw(raw: RawBackupRow) -> Result<BackupRecord, StorageError> {
    let (key_id, version, status, for_export, format_version, payload, status_changed_at) = raw;
    Ok(BackupRecord {
        key_id: KeyId::from_slice(&key_id)
            .ok_or_else(|| StorageError::Serialization("invalid key id".into()))?,
        version: version as u32,
        status: BackupStatus::from_i64(status)?,
        for_export,
        format_version: format_version as u32,
        payload,
        status_changed_at: status_changed_at as u64,
    })
}
