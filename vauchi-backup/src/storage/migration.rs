// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations with transactional safety. The runner tracks
//! applied versions in a `schema_version` table and runs pending migrations
//! in order within a single transaction.

use rusqlite::Connection;

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    /// Human-readable name for this migration.
    pub name: &'static str,
    pub sql: &'static str,
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Runs all pending migrations in one transaction; if any fails, all
    /// changes are rolled back.
    pub fn run(conn: &Connection, migrations: &[Migration]) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current_version = Self::current_version(conn)?;
        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        for window in pending.windows(2) {
            if window[0].version >= window[1].version {
                return Err(StorageError::Migration(format!(
                    "Migrations are not in order: v{} before v{}",
                    window[0].version, window[1].version
                )));
            }
        }

        conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION;")?;

        for migration in &pending {
            if let Err(e) = conn.execute_batch(migration.sql) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e
                )));
            }

            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            if let Err(e) = conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, now as i64],
            ) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e
                )));
            }
        }

        conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    /// Returns the current schema version, or 0 if no migrations have been applied.
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap_or(None);

        Ok(version.unwrap_or(0))
    }
}

/// Returns all registered migrations in version order.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "legacy_backup_keys",
            sql: MIGRATION_V1_LEGACY_BACKUPS,
        },
        Migration {
            version: 2,
            name: "device_backup_seeds",
            sql: MIGRATION_V2_DEVICE_BACKUPS,
        },
    ]
}

const MIGRATION_V1_LEGACY_BACKUPS: &str = "
CREATE TABLE IF NOT EXISTS backup_keys (
    key_id BLOB PRIMARY KEY,
    public_key BLOB NOT NULL,
    mac_key_encrypted BLOB NOT NULL,
    generated_at INTEGER NOT NULL,
    verification_count INTEGER NOT NULL DEFAULT 0,
    last_verified_at INTEGER,
    latest_version INTEGER,
    exported_version INTEGER,
    uploaded_version INTEGER
);

CREATE TABLE IF NOT EXISTS backups (
    key_id BLOB NOT NULL,
    version INTEGER NOT NULL,
    status INTEGER NOT NULL,
    for_export INTEGER NOT NULL,
    format_version INTEGER NOT NULL,
    payload BLOB,
    status_changed_at INTEGER NOT NULL,
    PRIMARY KEY (key_id, version)
);

CREATE INDEX IF NOT EXISTS idx_backups_status ON backups(key_id, status);
";

const MIGRATION_V2_DEVICE_BACKUPS: &str = "
CREATE TABLE IF NOT EXISTS device_backup_seeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_encrypted BLOB NOT NULL,
    server TEXT NOT NULL,
    active INTEGER NOT NULL,
    next_backup_at INTEGER NOT NULL,
    thread_id BLOB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_device_backup_seeds_active
    ON device_backup_seeds(active) WHERE active = 1;

CREATE TABLE IF NOT EXISTS profile_backup_threads (
    identity_id BLOB PRIMARY KEY,
    thread_id BLOB NOT NULL,
    next_backup_at INTEGER NOT NULL
);
";
