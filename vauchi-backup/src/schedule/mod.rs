// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Scheduling
//!
//! The [`Schedule`] holds at most one pending run per target (the device or
//! one owned identity). It is a plain value; the [`BackupScheduler`] wraps
//! it in a mutex, arms a single timer for its earliest deadline and executes
//! due runs on a dedicated worker thread.

pub mod delayed;
mod scheduler;
pub mod worker;

use std::collections::HashMap;

use crate::model::IdentityId;

pub use delayed::{DelayedTasks, TaskHandle};
pub use scheduler::{BackupRunner, BackupScheduler, RunOutcome, SchedulerError};
pub use worker::Worker;

/// Retry counts above this no longer grow the backoff.
pub const MAX_BACKOFF_EXPONENT: u32 = 32;

/// Milliseconds since the Unix epoch.
/// Falls back to 0 if the system clock is before UNIX_EPOCH.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What a scheduled run backs up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackupTarget {
    Device,
    Profile(IdentityId),
}

/// One pending backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledBackup {
    pub target: BackupTarget,
    /// When the run was asked for (ms).
    pub timestamp: u64,
    pub retry_count: u32,
    /// When the run actually fires, after backoff (ms).
    pub scheduled_timestamp: u64,
}

impl ScheduledBackup {
    pub fn new(target: BackupTarget, timestamp: u64) -> Self {
        ScheduledBackup {
            target,
            timestamp,
            retry_count: 0,
            scheduled_timestamp: timestamp,
        }
    }

    /// The entry to re-insert after a retriable failure at `now`.
    /// `jitter` is a uniform sample from `[0, 1)`.
    pub fn retried(&self, now: u64, base_delay_ms: u64, jitter: f64) -> Self {
        let retry_count = self.retry_count.saturating_add(1);
        ScheduledBackup {
            target: self.target.clone(),
            timestamp: self.timestamp,
            retry_count,
            scheduled_timestamp: now
                .saturating_add(backoff_delay(base_delay_ms, retry_count, jitter)),
        }
    }
}

/// `base * 2^min(retry, 32) * (1 + jitter)`, always inside
/// `[base * 2^min(retry, 32), 2 * base * 2^min(retry, 32))`.
pub fn backoff_delay(base_delay_ms: u64, retry_count: u32, jitter: f64) -> u64 {
    let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
    let floor = base_delay_ms.saturating_mul(2u64.saturating_pow(exponent));
    if floor == 0 {
        return 0;
    }
    let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
    let extra = ((floor as f64) * jitter) as u64;
    floor.saturating_add(extra.min(floor - 1))
}

/// Pending runs, at most one per target.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: HashMap<BackupTarget, ScheduledBackup>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `backup` unless an entry for the same target already fires no
    /// later. Returns whether the schedule changed.
    pub fn insert(&mut self, backup: ScheduledBackup) -> bool {
        if let Some(existing) = self.entries.get(&backup.target) {
            if existing.scheduled_timestamp <= backup.scheduled_timestamp {
                return false;
            }
        }
        self.entries.insert(backup.target.clone(), backup);
        true
    }

    /// Inserts `backup` whatever is pending for its target.
    pub fn replace(&mut self, backup: ScheduledBackup) {
        self.entries.insert(backup.target.clone(), backup);
    }

    pub fn get(&self, target: &BackupTarget) -> Option<&ScheduledBackup> {
        self.entries.get(target)
    }

    pub fn remove(&mut self, target: &BackupTarget) -> Option<ScheduledBackup> {
        self.entries.remove(target)
    }

    /// Earliest time a pending run fires.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|b| b.scheduled_timestamp).min()
    }

    /// Removes and returns every run due at `now`, earliest first.
    pub fn take_due(&mut self, now: u64) -> Vec<ScheduledBackup> {
        let due_targets: Vec<BackupTarget> = self
            .entries
            .values()
            .filter(|b| b.scheduled_timestamp <= now)
            .map(|b| b.target.clone())
            .collect();

        let mut due: Vec<ScheduledBackup> = due_targets
            .iter()
            .filter_map(|target| self.entries.remove(target))
            .collect();
        due.sort_by(|a, b| {
            a.scheduled_timestamp
                .cmp(&b.scheduled_timestamp)
                .then_with(|| a.target.cmp(&b.target))
        });
        due
    }

    /// Forgets backoff: every run fires at the time it was asked for.
    pub fn reset_retries(&mut self) {
        for backup in self.entries.values_mut() {
            backup.retry_count = 0;
            backup.scheduled_timestamp = backup.timestamp;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending runs, earliest first.
    pub fn entries(&self) -> Vec<ScheduledBackup> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.scheduled_timestamp
                .cmp(&b.scheduled_timestamp)
                .then_with(|| a.target.cmp(&b.target))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(backoff_delay(10, 0, 0.0), 10);
        assert_eq!(backoff_delay(10, 1, 0.0), 20);
        assert_eq!(backoff_delay(10, 3, 0.0), 80);
    }

    #[test]
    fn test_backoff_exponent_is_capped() {
        assert_eq!(backoff_delay(1, 40, 0.0), backoff_delay(1, 32, 0.0));
    }

    #[test]
    fn test_full_jitter_stays_below_double() {
        assert_eq!(backoff_delay(10, 0, 1.0), 19);
    }

    #[test]
    fn test_reset_retries_restores_requested_time() {
        let mut schedule = Schedule::new();
        let backup = ScheduledBackup::new(BackupTarget::Device, 100).retried(100, 10, 0.5);
        schedule.insert(backup);

        schedule.reset_retries();
        let entry = schedule.get(&BackupTarget::Device).unwrap();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.scheduled_timestamp, 100);
    }
}
