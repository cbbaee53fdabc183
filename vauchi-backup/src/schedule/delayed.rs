// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Delayed Tasks
//!
//! One background thread running closures after a delay. Used for the
//! scheduler timer, the ongoing-backup timeout and cleanup retries.
//! Cancelling is best-effort: a task already started keeps running.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

type Task = Box<dyn FnOnce() + Send>;
type TaskKey = (Instant, u64);

#[derive(Default)]
struct State {
    tasks: BTreeMap<TaskKey, Task>,
    next_id: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}

/// Handle to a pending task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    shared: Weak<Shared>,
    key: TaskKey,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

impl TaskHandle {
    /// Cancels the task if it has not started. Returns whether it was
    /// still pending; calling again is harmless.
    pub fn cancel(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                let removed = shared.state.lock().tasks.remove(&self.key).is_some();
                if removed {
                    shared.wakeup.notify_one();
                }
                removed
            }
            None => false,
        }
    }

    /// When the task is due.
    pub fn deadline(&self) -> Instant {
        self.key.0
    }
}

/// Longer delays are clamped. An early fire just re-arms.
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Timer thread owning a queue of delayed closures.
pub struct DelayedTasks {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl DelayedTasks {
    pub fn new(name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&thread_shared))?;

        Ok(DelayedTasks {
            shared,
            thread: Some(thread),
        })
    }

    /// Runs `task` once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let due = now
            .checked_add(delay.min(MAX_DELAY))
            .unwrap_or(now);
        let mut state = self.shared.state.lock();
        let key = (due, state.next_id);
        state.next_id += 1;
        state.tasks.insert(key, Box::new(task));
        drop(state);
        self.shared.wakeup.notify_one();

        TaskHandle {
            shared: Arc::downgrade(&self.shared),
            key,
        }
    }

    /// Number of tasks not yet started.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }
}

impl Drop for DelayedTasks {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            // The last owner may be a task running on the timer thread.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        let next = state.tasks.first_key_value().map(|(key, _)| *key);
        match next {
            Some(key) if key.0 <= Instant::now() => {
                if let Some(task) = state.tasks.remove(&key) {
                    MutexGuard::unlocked(&mut state, task);
                }
            }
            Some(key) => {
                shared.wakeup.wait_until(&mut state, key.0);
            }
            None => shared.wakeup.wait(&mut state),
        }
    }
}
