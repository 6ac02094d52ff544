// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-delay background tasks.
//!
//! Used by the pool evictor and the shared-client reaper. The worker sleeps
//! on a condvar rather than `thread::sleep`, so dropping the handle stops it
//! immediately instead of after one more interval.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

/// Handle to a running periodic task.
///
/// When dropped, signals the background thread to stop and joins it.
pub struct PeriodicTask {
    name: String,
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a thread that calls `tick` every `interval` (fixed delay: the
    /// next wait starts after `tick` returns).
    ///
    /// `tick` returns `false` to end the task early, e.g. when the state it
    /// maintains has been dropped.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let thread_signal = signal.clone();
        let thread_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                log::debug!("[{}] Started with interval {:?}", thread_name, interval);

                loop {
                    {
                        let mut stopped = thread_signal.stopped.lock();
                        if !*stopped {
                            thread_signal.condvar.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }

                    if !tick() {
                        break;
                    }
                }

                log::debug!("[{}] Stopped", thread_name);
            })
            .expect("failed to spawn periodic task thread");

        Self {
            name: name.to_string(),
            signal,
            thread: Some(thread),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task to stop and wait for it to exit.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
            self.signal.condvar.notify_all();
        }
        if let Some(handle) = self.thread.take() {
            // A task stopping itself from inside `tick` must not join itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_ticks_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let task = PeriodicTask::spawn("test-ticker", Duration::from_millis(5), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        });

        std::thread::sleep(Duration::from_millis(80));
        drop(task);
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_drop_stops_promptly() {
        let task = PeriodicTask::spawn("test-slow", Duration::from_secs(60), || true);
        assert_eq!(task.name(), "test-slow");

        let start = Instant::now();
        drop(task);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_tick_false_ends_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let _task = PeriodicTask::spawn("test-once", Duration::from_millis(2), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
