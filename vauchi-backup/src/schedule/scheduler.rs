// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backup Scheduler
//!
//! One mutex guards the [`Schedule`], the armed timer and the pending
//! `run_now` batch. It is never held while a backup executes: due runs are
//! handed to the worker and their outcomes re-enter through the same lock.

use std::collections::HashSet;
use std::sync::{mpsc, Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::delayed::{DelayedTasks, TaskHandle};
use super::worker::Worker;
use super::{now_millis, BackupTarget, Schedule, ScheduledBackup};
use crate::model::IdentityId;

/// Result of executing one scheduled backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Done; the next regular run is due at `next_run` (ms).
    Success { next_run: u64 },
    /// Try again with backoff.
    RetriableFailure,
    /// Precondition gone; drop without rescheduling.
    PermanentFailure,
}

/// Executes backups on behalf of the scheduler.
pub trait BackupRunner: Send + Sync {
    fn run_device_backup(&self) -> RunOutcome;

    fn run_profile_backup(&self, identity: &IdentityId) -> RunOutcome;

    /// Identities whose profiles `run_now` forces.
    fn owned_identities(&self) -> Vec<IdentityId>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The wait ended before every run reported; the outcome is unknown.
    #[error("Backup run interrupted before completion")]
    Interrupted,

    #[error("Failed to start background thread: {0}")]
    Spawn(String),
}

struct ArmedTimer {
    deadline: u64,
    handle: TaskHandle,
}

struct RunNowBatch {
    id: u64,
    pending: HashSet<BackupTarget>,
    retriable_failure: bool,
    done: mpsc::SyncSender<bool>,
}

#[derive(Default)]
struct State {
    schedule: Schedule,
    timer: Option<ArmedTimer>,
    batch: Option<RunNowBatch>,
    /// Targets whose next dispatch belongs to the current batch.
    forced: HashSet<BackupTarget>,
    next_batch_id: u64,
}

struct Inner {
    runner: Weak<dyn BackupRunner>,
    state: Mutex<State>,
    timers: Arc<DelayedTasks>,
    worker: Arc<Worker>,
    retry_base_delay_ms: u64,
}

/// Drives device and profile backups with coalescing and backoff.
#[derive(Clone)]
pub struct BackupScheduler {
    inner: Arc<Inner>,
}

impl BackupScheduler {
    /// Creates the scheduler on shared threads. The runner is held weakly
    /// so it may own the scheduler itself.
    pub fn new(
        runner: Weak<dyn BackupRunner>,
        retry_base_delay: Duration,
        worker: Arc<Worker>,
        timers: Arc<DelayedTasks>,
    ) -> Self {
        BackupScheduler {
            inner: Arc::new(Inner {
                runner,
                state: Mutex::new(State::default()),
                timers,
                worker,
                retry_base_delay_ms: retry_base_delay.as_millis() as u64,
            }),
        }
    }

    /// The worker every backup and its persistence runs on.
    pub fn worker(&self) -> &Worker {
        &self.inner.worker
    }

    /// Asks for a device backup at `timestamp` (ms). Ignored when one is
    /// already due sooner.
    pub fn schedule_device_backup(&self, timestamp: u64) {
        self.inner
            .schedule(ScheduledBackup::new(BackupTarget::Device, timestamp));
    }

    /// Asks for a profile backup of `identity` at `timestamp` (ms).
    pub fn schedule_profile_backup(&self, identity: &IdentityId, timestamp: u64) {
        self.inner.schedule(ScheduledBackup::new(
            BackupTarget::Profile(identity.clone()),
            timestamp,
        ));
    }

    /// Drops a pending profile run, e.g. when its identity is deleted.
    pub fn unschedule_profile_backup(&self, identity: &IdentityId) {
        let mut state = self.inner.state.lock();
        state
            .schedule
            .remove(&BackupTarget::Profile(identity.clone()));
        self.inner.rearm(&mut state, now_millis());
    }

    /// Forgets every pending run and disarms the timer.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock();
        state.schedule.clear();
        if let Some(timer) = state.timer.take() {
            timer.handle.cancel();
        }
        debug!("all scheduled backups cancelled");
    }

    /// Clears every retry counter and sweeps immediately.
    pub fn retry_now(&self) {
        let mut state = self.inner.state.lock();
        state.schedule.reset_retries();
        self.inner.sweep_locked(&mut state);
    }

    /// Forces the device and every profile backup now and waits for them.
    ///
    /// Returns `Ok(true)` when no run hit a retriable failure. A timeout, a
    /// superseding `run_now`, or a call from the worker itself yields
    /// [`SchedulerError::Interrupted`]: the runs may still complete.
    pub fn run_now(&self, timeout: Duration) -> Result<bool, SchedulerError> {
        if self.inner.worker.is_current() {
            return Err(SchedulerError::Interrupted);
        }
        let identities = match self.inner.runner.upgrade() {
            Some(runner) => runner.owned_identities(),
            None => return Err(SchedulerError::Interrupted),
        };

        let mut targets = vec![BackupTarget::Device];
        targets.extend(identities.into_iter().map(BackupTarget::Profile));

        let (done, result) = mpsc::sync_channel(1);
        {
            let mut state = self.inner.state.lock();
            let id = state.next_batch_id;
            state.next_batch_id += 1;
            state.forced = targets.iter().cloned().collect();
            state.batch = Some(RunNowBatch {
                id,
                pending: targets.iter().cloned().collect(),
                retriable_failure: false,
                done,
            });
            for target in targets {
                state.schedule.replace(ScheduledBackup::new(target, 0));
            }
            self.inner.sweep_locked(&mut state);
        }

        result
            .recv_timeout(timeout)
            .map_err(|_| SchedulerError::Interrupted)
    }

    /// Pending runs, earliest first.
    pub fn pending(&self) -> Vec<ScheduledBackup> {
        self.inner.state.lock().schedule.entries()
    }

    /// Deadline the timer is armed for, if any.
    pub fn armed_deadline(&self) -> Option<u64> {
        self.inner.state.lock().timer.as_ref().map(|t| t.deadline)
    }
}

impl Inner {
    fn schedule(self: &Arc<Self>, backup: ScheduledBackup) {
        let mut state = self.state.lock();
        if !state.schedule.insert(backup) {
            return;
        }
        self.sweep_locked(&mut state);
    }

    /// Dispatches every due run, then re-arms for what remains.
    fn sweep_locked(self: &Arc<Self>, state: &mut State) {
        let now = now_millis();
        let due = state.schedule.take_due(now);
        if !due.is_empty() {
            debug!(count = due.len(), "dispatching due backups");
        }
        for backup in due {
            // A run already in flight for a forced target does not count.
            let batch = if state.forced.remove(&backup.target) {
                state.batch.as_ref().map(|b| b.id)
            } else {
                None
            };
            let inner = Arc::downgrade(self);
            let submitted = self.worker.submit(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.execute(backup, batch);
                }
            });
            if !submitted {
                warn!("backup worker stopped, dropping due run");
            }
        }
        self.rearm(state, now);
    }

    /// Keeps exactly one timer, armed for the earliest deadline.
    fn rearm(self: &Arc<Self>, state: &mut State, now: u64) {
        let next = state.schedule.next_deadline();
        if let (Some(timer), Some(deadline)) = (&state.timer, next) {
            if timer.deadline == deadline {
                return;
            }
        }
        if let Some(timer) = state.timer.take() {
            timer.handle.cancel();
        }
        let Some(deadline) = next else {
            return;
        };

        let delay = Duration::from_millis(deadline.saturating_sub(now));
        let inner = Arc::downgrade(self);
        let handle = self.timers.schedule(delay, move || {
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.state.lock();
                state.timer = None;
                inner.sweep_locked(&mut state);
            }
        });
        debug!(deadline, delay_ms = delay.as_millis() as u64, "backup timer armed");
        state.timer = Some(ArmedTimer { deadline, handle });
    }

    /// Runs on the worker.
    fn execute(self: &Arc<Self>, backup: ScheduledBackup, batch: Option<u64>) {
        let outcome = match self.runner.upgrade() {
            Some(runner) => match &backup.target {
                BackupTarget::Device => runner.run_device_backup(),
                BackupTarget::Profile(identity) => runner.run_profile_backup(identity),
            },
            None => RunOutcome::PermanentFailure,
        };

        let mut state = self.state.lock();
        match outcome {
            RunOutcome::Success { next_run } => {
                info!(run = ?backup.target, next_run, "backup succeeded");
                state
                    .schedule
                    .insert(ScheduledBackup::new(backup.target.clone(), next_run));
            }
            RunOutcome::RetriableFailure => {
                let jitter: f64 = rand::thread_rng().gen();
                let retry = backup.retried(now_millis(), self.retry_base_delay_ms, jitter);
                warn!(
                    run = ?backup.target,
                    retry_count = retry.retry_count,
                    retry_at = retry.scheduled_timestamp,
                    "backup failed, retrying with backoff"
                );
                state.schedule.insert(retry);
            }
            RunOutcome::PermanentFailure => {
                debug!(run = ?backup.target, "backup dropped, precondition gone");
            }
        }

        let finished = match (batch, state.batch.as_mut()) {
            (Some(id), Some(current)) => {
                if current.id == id && current.pending.remove(&backup.target) {
                    current.retriable_failure |= outcome == RunOutcome::RetriableFailure;
                    current.pending.is_empty()
                } else {
                    false
                }
            }
            _ => false,
        };
        if finished {
            if let Some(completed) = state.batch.take() {
                let _ = completed.done.try_send(!completed.retriable_failure);
            }
        }

        self.sweep_locked(&mut state);
    }
}
