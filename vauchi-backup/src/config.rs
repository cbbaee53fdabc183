// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration for backup scheduling and storage

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "VAUCHI_BACKUP_";

/// Configuration for the backup subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Interval between successful device backups
    pub device_backup_interval: Duration,

    /// Interval between successful profile backups
    pub profile_backup_interval: Duration,

    /// Base of the exponential retry backoff
    pub retry_base_delay: Duration,

    /// How long a legacy backup may wait for all delegate parts
    pub ongoing_backup_timeout: Duration,

    /// Delay before retrying deletion of an inactive seed's backups
    pub legacy_cleanup_retry_delay: Duration,

    /// Quiet period after a content change before the legacy backup runs
    pub content_change_debounce: Duration,

    /// Database file
    pub storage_path: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            device_backup_interval: Duration::from_secs(24 * 3600), // 1 day
            profile_backup_interval: Duration::from_secs(7 * 24 * 3600), // 7 days
            retry_base_delay: Duration::from_secs(10),
            ongoing_backup_timeout: Duration::from_secs(30),
            legacy_cleanup_retry_delay: Duration::from_secs(60),
            content_change_debounce: Duration::from_secs(10),
            storage_path: PathBuf::from("backup.db"),
        }
    }
}

impl BackupConfig {
    /// Defaults with `VAUCHI_BACKUP_*` overrides applied.
    ///
    /// Durations are read in seconds (`VAUCHI_BACKUP_RETRY_BASE_DELAY_SECS`);
    /// unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BackupConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |name: &str| {
            lookup(&format!("{}{}_SECS", ENV_PREFIX, name))
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        let mut config = Self::default();
        if let Some(d) = secs("DEVICE_INTERVAL") {
            config.device_backup_interval = d;
        }
        if let Some(d) = secs("PROFILE_INTERVAL") {
            config.profile_backup_interval = d;
        }
        if let Some(d) = secs("RETRY_BASE_DELAY") {
            config.retry_base_delay = d;
        }
        if let Some(d) = secs("ONGOING_TIMEOUT") {
            config.ongoing_backup_timeout = d;
        }
        if let Some(d) = secs("CLEANUP_RETRY_DELAY") {
            config.legacy_cleanup_retry_delay = d;
        }
        if let Some(d) = secs("DEBOUNCE") {
            config.content_change_debounce = d;
        }
        if let Some(path) = lookup(&format!("{}STORAGE_PATH", ENV_PREFIX)) {
            config.storage_path = PathBuf::from(path);
        }
        config
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_intervals(mut self, device: Duration, profile: Duration) -> Self {
        self.device_backup_interval = device;
        self.profile_backup_interval = profile;
        self
    }

    pub fn with_ongoing_backup_timeout(mut self, timeout: Duration) -> Self {
        self.ongoing_backup_timeout = timeout;
        self
    }

    pub fn with_cleanup_retry_delay(mut self, delay: Duration) -> Self {
        self.legacy_cleanup_retry_delay = delay;
        self
    }

    pub fn with_content_change_debounce(mut self, debounce: Duration) -> Self {
        self.content_change_debounce = debounce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_overrides_defaults() {
        let env: HashMap<String, String> = [
            ("VAUCHI_BACKUP_RETRY_BASE_DELAY_SECS", "3"),
            ("VAUCHI_BACKUP_DEBOUNCE_SECS", "not a number"),
            ("VAUCHI_BACKUP_STORAGE_PATH", "/tmp/b.db"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = BackupConfig::from_lookup(|name| env.get(name).cloned());
        assert_eq!(config.retry_base_delay, Duration::from_secs(3));
        assert_eq!(config.content_change_debounce, Duration::from_secs(10));
        assert_eq!(config.storage_path, PathBuf::from("/tmp/b.db"));
    }
}
