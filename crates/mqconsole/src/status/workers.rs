// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded fan-out worker pool and join latch.
//!
//! # Architecture
//!
//! ```text
//! submit(job) --force_push--> ArrayQueue<Job> (bounded)
//!                                  |  full: oldest job is dropped
//!                                  v
//!                  worker-0 .. worker-N (condvar wakeup)
//! ```
//!
//! A dropped job is never run, but whatever it owns is dropped with it, so a
//! [`LatchGuard`] moved into the job still counts its latch down. Panics in a
//! job are caught and counted; the worker keeps running.

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    name: String,
    queue: ArrayQueue<Job>,
    stopped: Mutex<bool>,
    condvar: Condvar,
    completed: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
}

/// Counters reported by [`WorkerPool::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub threads: usize,
    pub queued: usize,
    pub completed: u64,
    pub discarded: u64,
    pub panicked: u64,
}

/// Fixed-size thread pool over a bounded discard-oldest queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize, capacity: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            name: name.to_string(),
            queue: ArrayQueue::new(capacity.max(1)),
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
            completed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let workers: Vec<JoinHandle<()>> = (0..threads)
            .map(|i| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("{}-{}", name, i))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        log::debug!(
            "[workers] {} started with {} threads, queue capacity {}",
            name,
            threads,
            capacity
        );
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job. When the queue is full the oldest pending job is dropped
    /// unrun to make room. After [`shutdown`](Self::shutdown) the job itself
    /// is dropped unrun.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let stopped = self.shared.stopped.lock();
        if *stopped {
            drop(stopped);
            self.shared.discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "[workers] {} is shut down, dropping submitted task",
                self.shared.name
            );
            drop(job);
            return;
        }
        let evicted = self.shared.queue.force_push(Box::new(job));
        self.shared.condvar.notify_one();
        drop(stopped);

        if let Some(evicted) = evicted {
            self.shared.discarded.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[workers] {} queue full, discarded oldest pending task",
                self.shared.name
            );
            drop(evicted);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.stopped.lock()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            threads: self.workers.lock().len(),
            queued: self.shared.queue.len(),
            completed: self.shared.completed.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut stopped = self.shared.stopped.lock();
            *stopped = true;
            self.shared.condvar.notify_all();
        }
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        if let Some(job) = shared.queue.pop() {
            match catch_unwind(AssertUnwindSafe(job)) {
                Ok(()) => {
                    shared.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    shared.panicked.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[workers] {} task panicked", shared.name);
                }
            }
            continue;
        }

        // Submit pushes under this lock, so an empty queue here stays empty
        // until the wait releases it.
        let mut stopped = shared.stopped.lock();
        if !shared.queue.is_empty() {
            continue;
        }
        if *stopped {
            break;
        }
        shared.condvar.wait(&mut stopped);
    }
}

/// One-shot countdown barrier.
pub struct CountDownLatch {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(count),
            condvar: Condvar::new(),
        })
    }

    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.condvar.notify_all();
            }
        }
    }

    pub fn count(&self) -> usize {
        *self.remaining.lock()
    }

    /// Guard that counts down once when dropped.
    pub fn guard(self: &Arc<Self>) -> LatchGuard {
        LatchGuard {
            latch: self.clone(),
        }
    }

    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.condvar.wait(&mut remaining);
        }
    }

    /// Wait up to `timeout`; returns `true` if the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.condvar.wait_until(&mut remaining, deadline).timed_out() {
                return *remaining == 0;
            }
        }
        true
    }
}

/// Counts its latch down exactly once, on drop.
pub struct LatchGuard {
    latch: Arc<CountDownLatch>,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
