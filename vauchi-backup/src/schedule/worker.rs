// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Single-threaded job queue. Jobs run one at a time in submission order.

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send>;

pub struct Worker {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
        })?;

        Ok(Worker {
            sender: Mutex::new(Some(sender)),
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    /// Queues `job`. Returns false once the worker is shutting down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// True when called from a job.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Runs `job` on the worker and waits for its result. Called from a job,
    /// it runs inline instead of deadlocking.
    pub fn run_blocking<T, F>(&self, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current() {
            return Some(job());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        if !self.submit(move || {
            let _ = tx.send(job());
        }) {
            return None;
        }
        rx.recv().ok()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_order() {
        let worker = Worker::new("test-worker").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            worker.submit(move || log.lock().push(i));
        }
        worker.run_blocking(|| ()).unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }
}
