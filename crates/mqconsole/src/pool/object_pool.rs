// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded blocking object pool.
//!
//! Objects are handed out as `Arc<T>` and tracked by pointer identity while
//! borrowed, so a foreign or double return is detected.
//!
//! # Accounting
//!
//! ```text
//! total = idle + borrowed + pending        (pending: being created or tested)
//! total <= max_total                       at all times
//! ```
//!
//! Idle entries live in a deque with the most recently returned object at the
//! front (LIFO reuse keeps the working set warm; the sweep walks from the
//! back, oldest first).

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::background::PeriodicTask;
use crate::error::{Error, Result};

/// Lifecycle hooks the pool drives.
pub trait PooledObjectFactory: Send + Sync + 'static {
    type Object: ?Sized + Send + Sync + 'static;

    fn create(&self) -> Result<Arc<Self::Object>>;

    /// Health probe; `false` evicts and destroys the object.
    fn validate(&self, object: &Self::Object) -> bool;

    fn destroy(&self, object: Arc<Self::Object>) -> Result<()>;

    /// Short label for logs and errors.
    fn describe(&self, object: &Self::Object) -> String;
}

/// Pool sizing and sweep behavior.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub name: String,
    pub max_total: usize,
    pub max_idle: usize,
    pub min_idle: usize,
    pub max_wait: Duration,
    /// `None` disables the background sweep; [`ObjectPool::evict`] still works.
    pub eviction_interval: Option<Duration>,
    pub min_evictable_idle: Option<Duration>,
    pub test_on_borrow: bool,
    pub test_while_idle: bool,
}

impl PoolSettings {
    /// Capacity-1 pool with validate-on-idle, as used per credential.
    pub fn single(name: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            name: name.into(),
            max_total: 1,
            max_idle: 1,
            min_idle: 0,
            max_wait,
            eviction_interval: None,
            min_evictable_idle: None,
            test_on_borrow: false,
            test_while_idle: true,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub active: usize,
    pub idle: usize,
    pub created: u64,
    pub destroyed: u64,
    pub destroyed_by_validation: u64,
    pub borrow_timeouts: u64,
}

struct IdleEntry<T: ?Sized> {
    object: Arc<T>,
    idle_since: Instant,
}

struct PoolState<T: ?Sized> {
    idle: VecDeque<IdleEntry<T>>,
    borrowed: HashSet<usize>,
    pending: usize,
    closed: bool,
}

impl<T: ?Sized> PoolState<T> {
    fn total(&self) -> usize {
        self.idle.len() + self.borrowed.len() + self.pending
    }
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    destroyed_by_validation: AtomicU64,
    borrow_timeouts: AtomicU64,
}

fn identity<T: ?Sized>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object).cast::<()>() as usize
}

struct PoolInner<F: PooledObjectFactory> {
    settings: PoolSettings,
    factory: F,
    state: Mutex<PoolState<F::Object>>,
    available: Condvar,
    counters: Counters,
}

/// Bounded pool of factory-built objects.
///
/// Dropping the pool closes it.
pub struct ObjectPool<F: PooledObjectFactory> {
    inner: Arc<PoolInner<F>>,
    evictor: Mutex<Option<PeriodicTask>>,
}

impl<F: PooledObjectFactory> ObjectPool<F> {
    /// Create an empty pool and start its idle sweep, if configured.
    ///
    /// No object is created here; `min_idle` is filled by the first sweep.
    pub fn new(factory: F, settings: PoolSettings) -> Self {
        let interval = settings.eviction_interval;
        let inner = Arc::new(PoolInner {
            settings,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                borrowed: HashSet::new(),
                pending: 0,
                closed: false,
            }),
            available: Condvar::new(),
            counters: Counters::default(),
        });

        let evictor = interval.map(|interval| {
            let weak: Weak<PoolInner<F>> = Arc::downgrade(&inner);
            let task_name = format!("pool-evictor-{}", inner.settings.name);
            PeriodicTask::spawn(&task_name, interval, move || match weak.upgrade() {
                Some(inner) => {
                    inner.evict();
                    true
                }
                None => false,
            })
        });

        log::debug!(
            "[pool] {} created (max_total={}, max_idle={}, min_idle={}, max_wait={:?})",
            inner.settings.name,
            inner.settings.max_total,
            inner.settings.max_idle,
            inner.settings.min_idle,
            inner.settings.max_wait
        );

        Self {
            inner,
            evictor: Mutex::new(evictor),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.settings.name
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Borrow an object, creating one if under capacity.
    ///
    /// Blocks up to `max_wait` when the pool is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing became available in time
    /// - [`Error::PoolClosed`] if the pool is closed
    /// - whatever the factory returns when creation fails
    pub fn borrow(&self) -> Result<Arc<F::Object>> {
        self.inner.borrow()
    }

    /// Return a borrowed object.
    ///
    /// Surplus objects (above `max_idle`, or after close) are destroyed.
    pub fn give_back(&self, object: Arc<F::Object>) -> Result<()> {
        self.inner.give_back(object)
    }

    /// Destroy a borrowed object instead of returning it.
    pub fn invalidate(&self, object: Arc<F::Object>) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if !state.borrowed.remove(&identity(&object)) {
                return Err(Error::ForeignObject(self.inner.factory.describe(&object)));
            }
        }
        self.inner.available.notify_one();
        self.inner.destroy(object)
    }

    pub fn validate(&self, object: &F::Object) -> bool {
        self.inner.factory.validate(object)
    }

    /// Run one idle sweep now (the background sweep calls the same code).
    ///
    /// Returns the number of objects destroyed.
    pub fn evict(&self) -> usize {
        self.inner.evict()
    }

    /// Close the pool: destroy idle objects, stop the sweep, fail future borrows.
    ///
    /// Objects still borrowed are destroyed when given back.
    pub fn close(&self) {
        let idle: Vec<IdleEntry<F::Object>> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.inner.available.notify_all();

        if let Some(mut evictor) = self.evictor.lock().take() {
            evictor.stop();
        }

        let count = idle.len();
        for entry in idle {
            self.inner.destroy_quietly(entry.object, "close");
        }
        log::debug!(
            "[pool] {} closed ({} idle destroyed)",
            self.inner.settings.name,
            count
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether this pool runs its own sweep thread.
    pub fn sweeps_in_background(&self) -> bool {
        self.evictor.lock().is_some()
    }

    pub fn stats(&self) -> PoolStats {
        let (active, idle) = {
            let state = self.inner.state.lock();
            (state.borrowed.len(), state.idle.len())
        };
        let counters = &self.inner.counters;
        PoolStats {
            name: self.inner.settings.name.clone(),
            active,
            idle,
            created: counters.created.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
            destroyed_by_validation: counters.destroyed_by_validation.load(Ordering::Relaxed),
            borrow_timeouts: counters.borrow_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl<F: PooledObjectFactory> Drop for ObjectPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: PooledObjectFactory> PoolInner<F> {
    fn closed_error(&self) -> Error {
        Error::PoolClosed(self.settings.name.clone())
    }

    fn borrow(&self) -> Result<Arc<F::Object>> {
        let start = Instant::now();
        let deadline = start + self.settings.max_wait;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(self.closed_error());
            }

            if let Some(entry) = state.idle.pop_front() {
                let object = entry.object;
                if self.settings.test_on_borrow && !self.test_unlocked(&mut state, &object) {
                    self.counters
                        .destroyed_by_validation
                        .fetch_add(1, Ordering::Relaxed);
                    MutexGuard::unlocked(&mut state, || {
                        self.destroy_quietly(object, "validation on borrow");
                    });
                    continue;
                }
                state.borrowed.insert(identity(&object));
                return Ok(object);
            }

            if state.total() < self.settings.max_total {
                let created = self.unlocked_pending(&mut state, 1, || self.create_checked());

                return match created {
                    Ok(object) => {
                        if state.closed {
                            MutexGuard::unlocked(&mut state, || {
                                self.destroy_quietly(object, "created after close");
                            });
                            return Err(self.closed_error());
                        }
                        state.borrowed.insert(identity(&object));
                        Ok(object)
                    }
                    Err(e) => {
                        // The reserved slot is free again.
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            if self.available.wait_until(&mut state, deadline).timed_out() {
                self.counters.borrow_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Timeout {
                    pool: self.settings.name.clone(),
                    waited: start.elapsed(),
                });
            }
        }
    }

    /// Validate with the lock released; the object counts as pending meanwhile.
    fn test_unlocked(
        &self,
        state: &mut MutexGuard<'_, PoolState<F::Object>>,
        object: &Arc<F::Object>,
    ) -> bool {
        self.unlocked_pending(state, 1, || self.factory.validate(object))
    }

    /// Run `f` with the lock released and `slots` reserved as pending.
    ///
    /// The reservation is released even if `f` panics, so a faulty factory
    /// cannot wedge the pool; the panic then resumes.
    fn unlocked_pending<R>(
        &self,
        state: &mut MutexGuard<'_, PoolState<F::Object>>,
        slots: usize,
        f: impl FnOnce() -> R,
    ) -> R {
        state.pending += slots;
        let outcome = MutexGuard::unlocked(state, || panic::catch_unwind(AssertUnwindSafe(f)));
        state.pending -= slots;
        match outcome {
            Ok(value) => value,
            Err(payload) => {
                self.available.notify_all();
                log::warn!(
                    "[pool] {} factory panicked, releasing {} reserved slot(s)",
                    self.settings.name,
                    slots
                );
                panic::resume_unwind(payload)
            }
        }
    }

    /// Create an object; with `test_on_borrow` it must also pass validation.
    fn create_checked(&self) -> Result<Arc<F::Object>> {
        let object = self.factory.create()?;
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        if self.settings.test_on_borrow && !self.factory.validate(&object) {
            let label = self.factory.describe(&object);
            self.counters
                .destroyed_by_validation
                .fetch_add(1, Ordering::Relaxed);
            self.destroy_quietly(object, "validation on creation");
            return Err(Error::ValidationFailed(label));
        }
        Ok(object)
    }

    fn give_back(&self, object: Arc<F::Object>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.borrowed.remove(&identity(&object)) {
            return Err(Error::ForeignObject(self.factory.describe(&object)));
        }

        if !state.closed && state.idle.len() < self.settings.max_idle {
            state.idle.push_front(IdleEntry {
                object,
                idle_since: Instant::now(),
            });
            drop(state);
            self.available.notify_one();
            return Ok(());
        }

        drop(state);
        self.available.notify_one();
        self.destroy(object)
    }

    fn destroy(&self, object: Arc<F::Object>) -> Result<()> {
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        let label = self.factory.describe(&object);
        self.factory.destroy(object).map_err(|e| {
            log::warn!(
                "[pool] {} failed to destroy {}: {}",
                self.settings.name,
                label,
                e
            );
            e
        })
    }

    fn destroy_quietly(&self, object: Arc<F::Object>, reason: &str) {
        let label = self.factory.describe(&object);
        if self.destroy(object).is_ok() {
            log::debug!(
                "[pool] {} destroyed {} ({})",
                self.settings.name,
                label,
                reason
            );
        }
    }

    fn evict(&self) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        let taken: Vec<IdleEntry<F::Object>> = state.idle.drain(..).collect();
        let examined = taken.len();
        let (kept, destroyed) = self.unlocked_pending(&mut state, examined, || self.sweep(taken));

        let leftovers = if state.closed {
            kept
        } else {
            // Entries returned during the sweep are newer and already at the front.
            for entry in kept.into_iter().rev() {
                state.idle.push_back(entry);
            }
            Vec::new()
        };
        drop(state);
        self.available.notify_all();

        for entry in leftovers {
            self.destroy_quietly(entry.object, "pool closed during sweep");
        }

        self.ensure_min_idle();
        destroyed
    }

    /// Destroy expired or unhealthy entries; returns the survivors oldest-first.
    fn sweep(&self, taken: Vec<IdleEntry<F::Object>>) -> (Vec<IdleEntry<F::Object>>, usize) {
        let now = Instant::now();
        let examined = taken.len();
        let mut destroyed = 0;
        let mut kept = Vec::with_capacity(examined);

        for entry in taken.into_iter().rev() {
            let remaining = examined - destroyed;
            let expired = self
                .settings
                .min_evictable_idle
                .is_some_and(|limit| now.duration_since(entry.idle_since) >= limit);
            if expired && remaining > self.settings.min_idle {
                self.destroy_quietly(entry.object, "idle timeout");
                destroyed += 1;
                continue;
            }

            if self.settings.test_while_idle && !self.factory.validate(&entry.object) {
                log::warn!(
                    "[pool] {} evicting {} after failed health probe",
                    self.settings.name,
                    self.factory.describe(&entry.object)
                );
                self.counters
                    .destroyed_by_validation
                    .fetch_add(1, Ordering::Relaxed);
                self.destroy_quietly(entry.object, "validation while idle");
                destroyed += 1;
                continue;
            }

            kept.push(entry);
        }
        (kept, destroyed)
    }

    fn ensure_min_idle(&self) {
        if self.settings.min_idle == 0 {
            return;
        }

        let mut state = self.state.lock();
        while !state.closed
            && state.idle.len() < self.settings.min_idle
            && state.total() < self.settings.max_total
        {
            let created = self.unlocked_pending(&mut state, 1, || self.factory.create());

            match created {
                Ok(object) => {
                    self.counters.created.fetch_add(1, Ordering::Relaxed);
                    state.idle.push_back(IdleEntry {
                        object,
                        idle_since: Instant::now(),
                    });
                    self.available.notify_one();
                }
                Err(e) => {
                    log::warn!(
                        "[pool] {} could not top up idle objects: {}",
                        self.settings.name,
                        e
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Barrier;

    #[derive(Debug)]
    struct Conn {
        id: usize,
        healthy: AtomicBool,
        destroyed: AtomicBool,
    }

    #[derive(Default)]
    struct TestFactory {
        next_id: AtomicUsize,
        fail_create: AtomicBool,
        panic_create: AtomicBool,
    }

    impl PooledObjectFactory for TestFactory {
        type Object = Conn;

        fn create(&self) -> Result<Arc<Conn>> {
            if self.panic_create.swap(false, Ordering::SeqCst) {
                panic!("connector bug");
            }
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(Error::Remote(crate::client::RemoteError::Unreachable(
                    "conn".into(),
                )));
            }
            Ok(Arc::new(Conn {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                healthy: AtomicBool::new(true),
                destroyed: AtomicBool::new(false),
            }))
        }

        fn validate(&self, object: &Conn) -> bool {
            object.healthy.load(Ordering::SeqCst)
        }

        fn destroy(&self, object: Arc<Conn>) -> Result<()> {
            object.destroyed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn describe(&self, object: &Conn) -> String {
            format!("conn-{}", object.id)
        }
    }

    fn settings(max_total: usize, max_wait: Duration) -> PoolSettings {
        PoolSettings {
            name: "test".into(),
            max_total,
            max_idle: max_total,
            min_idle: 0,
            max_wait,
            eviction_interval: None,
            min_evictable_idle: None,
            test_on_borrow: false,
            test_while_idle: true,
        }
    }

    #[test]
    fn test_reuses_returned_object() {
        let pool = ObjectPool::new(TestFactory::default(), settings(2, Duration::from_secs(1)));

        let first = pool.borrow().expect("borrow");
        let first_id = first.id;
        pool.give_back(first).expect("give back");

        let again = pool.borrow().expect("borrow");
        assert_eq!(again.id, first_id);
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().active, 1);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let pool = ObjectPool::new(
            TestFactory::default(),
            settings(1, Duration::from_millis(50)),
        );
        let _held = pool.borrow().expect("borrow");

        let start = Instant::now();
        let err = pool.borrow().err().expect("exhausted borrow must fail");
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(pool.stats().borrow_timeouts, 1);
    }

    #[test]
    fn test_waiter_wakes_on_return() {
        let pool = Arc::new(ObjectPool::new(
            TestFactory::default(),
            settings(1, Duration::from_secs(5)),
        ));
        let held = pool.borrow().expect("borrow");
        let barrier = Arc::new(Barrier::new(2));

        let waiter = {
            let pool = pool.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                pool.borrow().map(|conn| conn.id)
            })
        };

        barrier.wait();
        std::thread::sleep(Duration::from_millis(30));
        let held_id = held.id;
        pool.give_back(held).expect("give back");

        let got = waiter.join().expect("join").expect("borrow after return");
        assert_eq!(got, held_id);
    }

    #[test]
    fn test_foreign_and_double_return_rejected() {
        let pool = ObjectPool::new(TestFactory::default(), settings(2, Duration::from_secs(1)));
        let outsider = TestFactory::default().create().expect("create");
        assert!(matches!(
            pool.give_back(outsider),
            Err(Error::ForeignObject(_))
        ));

        let conn = pool.borrow().expect("borrow");
        pool.give_back(conn.clone()).expect("first return");
        assert!(matches!(pool.give_back(conn), Err(Error::ForeignObject(_))));
    }

    #[test]
    fn test_sweep_destroys_unhealthy() {
        let pool = ObjectPool::new(TestFactory::default(), settings(2, Duration::from_secs(1)));
        let conn = pool.borrow().expect("borrow");
        let keep = conn.clone();
        pool.give_back(conn).expect("give back");

        keep.healthy.store(false, Ordering::SeqCst);
        assert_eq!(pool.evict(), 1);
        assert!(keep.destroyed.load(Ordering::SeqCst));

        let fresh = pool.borrow().expect("borrow");
        assert_ne!(fresh.id, keep.id);
        assert_eq!(pool.stats().destroyed_by_validation, 1);
    }

    #[test]
    fn test_test_on_borrow_skips_unhealthy() {
        let mut cfg = settings(2, Duration::from_secs(1));
        cfg.test_on_borrow = true;
        let pool = ObjectPool::new(TestFactory::default(), cfg);

        let conn = pool.borrow().expect("borrow");
        conn.healthy.store(false, Ordering::SeqCst);
        let stale_id = conn.id;
        pool.give_back(conn).expect("give back");

        let fresh = pool.borrow().expect("borrow");
        assert_ne!(fresh.id, stale_id);
    }

    #[test]
    fn test_idle_timeout_respects_min_idle() {
        let mut cfg = settings(3, Duration::from_secs(1));
        cfg.min_idle = 1;
        cfg.min_evictable_idle = Some(Duration::from_millis(1));
        let pool = ObjectPool::new(TestFactory::default(), cfg);

        let a = pool.borrow().expect("a");
        let b = pool.borrow().expect("b");
        pool.give_back(a).expect("a back");
        pool.give_back(b).expect("b back");
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(pool.evict(), 1);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_min_idle_topped_up_by_sweep() {
        let mut cfg = settings(4, Duration::from_secs(1));
        cfg.min_idle = 2;
        let pool = ObjectPool::new(TestFactory::default(), cfg);
        assert_eq!(pool.stats().idle, 0);

        pool.evict();
        assert_eq!(pool.stats().idle, 2);
        assert_eq!(pool.stats().created, 2);
    }

    #[test]
    fn test_surplus_destroyed_on_return() {
        let mut cfg = settings(2, Duration::from_secs(1));
        cfg.max_idle = 1;
        let pool = ObjectPool::new(TestFactory::default(), cfg);

        let a = pool.borrow().expect("a");
        let b = pool.borrow().expect("b");
        let b_conn = b.clone();
        pool.give_back(a).expect("a back");
        pool.give_back(b).expect("b back");

        assert!(b_conn.destroyed.load(Ordering::SeqCst));
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_create_failure_frees_slot() {
        let pool = ObjectPool::new(TestFactory::default(), settings(1, Duration::from_millis(20)));
        pool.factory().fail_create.store(true, Ordering::SeqCst);
        assert!(matches!(pool.borrow(), Err(Error::Remote(_))));

        pool.factory().fail_create.store(false, Ordering::SeqCst);
        assert!(pool.borrow().is_ok());
    }

    #[test]
    fn test_close_fails_borrow_and_destroys_late_returns() {
        let pool = ObjectPool::new(TestFactory::default(), settings(2, Duration::from_secs(1)));
        let idle = pool.borrow().expect("idle");
        let held = pool.borrow().expect("held");
        let idle_conn = idle.clone();
        let held_conn = held.clone();
        pool.give_back(idle).expect("give back");
        assert_eq!(pool.stats().idle, 1);

        pool.close();
        assert!(pool.is_closed());
        assert!(idle_conn.destroyed.load(Ordering::SeqCst));
        assert!(matches!(pool.borrow(), Err(Error::PoolClosed(_))));

        pool.give_back(held).expect("late return");
        assert!(held_conn.destroyed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_create_panic_releases_slot() {
        let pool = Arc::new(ObjectPool::new(
            TestFactory::default(),
            settings(1, Duration::from_millis(50)),
        ));
        pool.factory().panic_create.store(true, Ordering::SeqCst);

        let panicked = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.borrow().map(|_| ()))
                .join()
                .is_err()
        };
        assert!(panicked);

        let conn = pool.borrow().expect("slot released after panic");
        assert_eq!(pool.stats().active, 1);
        pool.give_back(conn).expect("give back");
    }

    #[test]
    fn test_validate_panic_during_sweep_releases_slots() {
        #[derive(Debug)]
        struct Fragile;

        struct FragileFactory {
            panic_validate: AtomicBool,
        }

        impl PooledObjectFactory for FragileFactory {
            type Object = Fragile;

            fn create(&self) -> Result<Arc<Fragile>> {
                Ok(Arc::new(Fragile))
            }

            fn validate(&self, _object: &Fragile) -> bool {
                if self.panic_validate.swap(false, Ordering::SeqCst) {
                    panic!("health check hung up");
                }
                true
            }

            fn destroy(&self, _object: Arc<Fragile>) -> Result<()> {
                Ok(())
            }

            fn describe(&self, _object: &Fragile) -> String {
                "fragile".into()
            }
        }

        let pool = Arc::new(ObjectPool::new(
            FragileFactory {
                panic_validate: AtomicBool::new(false),
            },
            settings(1, Duration::from_millis(50)),
        ));
        let object = pool.borrow().expect("borrow");
        pool.give_back(object).expect("give back");
        pool.factory().panic_validate.store(true, Ordering::SeqCst);

        let panicked = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.evict()).join().is_err()
        };
        assert!(panicked);
        assert!(pool.borrow().is_ok());
    }

    #[test]
    fn test_fresh_object_failing_validation_rejected() {
        struct Broken;

        struct BrokenFactory;

        impl PooledObjectFactory for BrokenFactory {
            type Object = Broken;

            fn create(&self) -> Result<Arc<Broken>> {
                Ok(Arc::new(Broken))
            }

            fn validate(&self, _object: &Broken) -> bool {
                false
            }

            fn destroy(&self, _object: Arc<Broken>) -> Result<()> {
                Ok(())
            }

            fn describe(&self, _object: &Broken) -> String {
                "broken".into()
            }
        }

        let mut cfg = settings(1, Duration::from_millis(50));
        cfg.test_on_borrow = true;
        let pool = ObjectPool::new(BrokenFactory, cfg);

        let err = pool.borrow().err().expect("invalid object must not be lent");
        assert!(matches!(err, Error::ValidationFailed(ref label) if label == "broken"));
        let stats = pool.stats();
        assert_eq!((stats.created, stats.destroyed, stats.destroyed_by_validation), (1, 1, 1));
        // The slot is free again.
        assert!(matches!(pool.borrow(), Err(Error::ValidationFailed(_))));
    }

    #[test]
    fn test_background_sweep_runs() {
        let mut cfg = settings(1, Duration::from_secs(1));
        cfg.eviction_interval = Some(Duration::from_millis(5));
        let pool = ObjectPool::new(TestFactory::default(), cfg);

        let conn = pool.borrow().expect("borrow");
        let keep = conn.clone();
        pool.give_back(conn).expect("give back");
        keep.healthy.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !keep.destroyed.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(keep.destroyed.load(Ordering::SeqCst));
    }
}
