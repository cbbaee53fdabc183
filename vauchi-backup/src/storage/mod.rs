// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Backup keys, backup versions, device backup seeds and profile threads in
//! SQLite. Secrets (MAC keys, seeds) are encrypted with the storage key
//! before they reach the database.

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod keys;
#[cfg(not(feature = "testing"))]
mod keys;

#[cfg(feature = "testing")]
pub mod seeds;
#[cfg(not(feature = "testing"))]
mod seeds;

pub mod migration;

pub use error::StorageError;
pub use keys::{BackupKeyRecord, BackupRecord, BackupStatus};
pub use seeds::{DeviceBackupSeedRecord, ProfileBackupThread};

use rusqlite::Connection;
use std::path::Path;

use crate::crypto::SymmetricKey;

/// SQLite-based storage implementation.
pub struct Storage {
    conn: Connection,
    /// Key protecting secrets at rest
    pub(crate) encryption_key: SymmetricKey,
}

impl Storage {
    /// Opens or creates a storage database at the given path.
    pub fn open<P: AsRef<Path>>(
        path: P,
        encryption_key: SymmetricKey,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Storage {
            conn,
            encryption_key,
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates an in-memory storage (for testing).
    pub fn in_memory(encryption_key: SymmetricKey) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage {
            conn,
            encryption_key,
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let migrations = migration::all_migrations();
        migration::MigrationRunner::run(&self.conn, &migrations)
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migration::MigrationRunner::current_version(&self.conn)
    }

    /// Runs `f` inside one transaction. An error from `f` rolls everything
    /// back; a failed commit is reported as [`StorageError::Commit`].
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Storage) -> Result<T, StorageError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(self) {
            Ok(value) => match self.conn.execute_batch("COMMIT;") {
                Ok(()) => Ok(value),
                Err(e) => {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    Err(StorageError::Commit(e.to_string()))
                }
            },
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        crate::crypto::encrypt(&self.encryption_key, plaintext)
            .map_err(|e| StorageError::Encryption(e.to_string()))
    }

    fn open_sealed(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StorageError> {
        crate::crypto::decrypt(&self.encryption_key, ciphertext)
            .map_err(|e| StorageError::Encryption(e.to_string()))
    }
}
