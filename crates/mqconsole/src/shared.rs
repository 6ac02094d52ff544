// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazily started, idle-reaped shared pull session.
//!
//! ```text
//! Absent --get()--> Starting --start ok--> Ready --idle > threshold--> Absent
//!                      |                     |
//!                      +--start failed-------+--close()------------->  Absent
//! ```
//!
//! Callers hold a [`SharedClientLease`] while they use the session. The reaper
//! only shuts the session down when no lease is outstanding, and dropping a
//! lease counts as a use.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::background::PeriodicTask;
use crate::client::{ClientConnector, PullClient, SharedPull};
use crate::config::ConsoleConfig;
use crate::error::{Error, Result};
use crate::pool::factory::timestamped_instance_name;

/// Group the shared pull session registers under.
pub const SHARED_PULL_GROUP: &str = "mqconsole_shared_pull_group";

enum SlotState {
    Absent,
    Starting,
    Ready(SharedPull),
}

struct Slot {
    state: SlotState,
    last_used: Instant,
    /// Leases on the current session only.
    leases: usize,
    /// Bumped for every started session; older leases no longer count.
    generation: u64,
}

struct SharedInner {
    connector: Arc<dyn ClientConnector>,
    config: Arc<ConsoleConfig>,
    idle_timeout: Duration,
    slot: Mutex<Slot>,
    ready: Condvar,
}

/// One pull session shared by every caller, created on first use.
pub struct LazySharedClient {
    inner: Arc<SharedInner>,
    _reaper: PeriodicTask,
}

impl LazySharedClient {
    pub fn new(connector: Arc<dyn ClientConnector>, config: Arc<ConsoleConfig>) -> Self {
        let idle_timeout = config.shared_client.idle_timeout();
        let reap_interval = config.shared_client.reap_interval();
        let inner = Arc::new(SharedInner {
            connector,
            config,
            idle_timeout,
            slot: Mutex::new(Slot {
                state: SlotState::Absent,
                last_used: Instant::now(),
                leases: 0,
                generation: 0,
            }),
            ready: Condvar::new(),
        });

        let weak: Weak<SharedInner> = Arc::downgrade(&inner);
        let reaper = PeriodicTask::spawn("shared-client-reaper", reap_interval, move || {
            match weak.upgrade() {
                Some(inner) => {
                    inner.reap_if_idle();
                    true
                }
                None => false,
            }
        });

        Self {
            inner,
            _reaper: reaper,
        }
    }

    /// Lease the shared session, starting it if absent.
    ///
    /// Concurrent callers during startup wait for the one starting it. If the
    /// start fails the half-built session is shut down, the slot returns to
    /// absent and [`Error::StartFailure`] is returned; the next call retries.
    pub fn get(&self) -> Result<SharedClientLease> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock();
        loop {
            match &slot.state {
                SlotState::Ready(client) => {
                    let client = client.clone();
                    return Ok(inner.lease(&mut slot, client));
                }
                SlotState::Starting => inner.ready.wait(&mut slot),
                SlotState::Absent => break,
            }
        }

        slot.state = SlotState::Starting;
        let started = MutexGuard::unlocked(&mut slot, || {
            panic::catch_unwind(AssertUnwindSafe(|| inner.start_client()))
        });
        let outcome = match started {
            Ok(Ok(client)) => {
                slot.state = SlotState::Ready(client.clone());
                slot.generation += 1;
                slot.leases = 0;
                Ok(inner.lease(&mut slot, client))
            }
            Ok(Err(e)) => {
                slot.state = SlotState::Absent;
                Err(e)
            }
            Err(payload) => {
                slot.state = SlotState::Absent;
                inner.ready.notify_all();
                log::warn!("[shared-client] connector panicked during start");
                panic::resume_unwind(payload)
            }
        };
        inner.ready.notify_all();
        outcome
    }

    /// Whether a started session is currently held.
    pub fn is_active(&self) -> bool {
        matches!(self.inner.slot.lock().state, SlotState::Ready(_))
    }

    /// Shut the session down now, leases or not.
    pub fn close(&self) {
        let taken = {
            let mut slot = self.inner.slot.lock();
            match std::mem::replace(&mut slot.state, SlotState::Absent) {
                SlotState::Ready(client) => {
                    slot.leases = 0;
                    Some(client)
                }
                other => {
                    slot.state = other;
                    None
                }
            }
        };
        if let Some(client) = taken {
            shutdown_quietly(client.as_ref(), "closed");
        }
    }

    /// Run one reaper pass immediately.
    pub fn reap_now(&self) -> bool {
        self.inner.reap_if_idle()
    }
}

impl Drop for LazySharedClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl SharedInner {
    fn lease(self: &Arc<Self>, slot: &mut Slot, client: SharedPull) -> SharedClientLease {
        slot.last_used = Instant::now();
        slot.leases += 1;
        SharedClientLease {
            inner: self.clone(),
            client,
            generation: slot.generation,
        }
    }

    fn start_client(&self) -> Result<SharedPull> {
        let instance_name =
            timestamped_instance_name(&format!("{}_pull", self.config.instance_prefix));
        let options = self.config.session_options(
            instance_name.clone(),
            SHARED_PULL_GROUP.to_string(),
            self.config.credential.clone(),
        );

        let what = format!("shared pull client {}", instance_name);
        let client = self
            .connector
            .create_pull(&options)
            .map_err(|source| Error::StartFailure {
                what: what.clone(),
                source,
            })?;

        if let Err(source) = client.start() {
            shutdown_quietly(client.as_ref(), "half-started");
            return Err(Error::StartFailure { what, source });
        }

        log::debug!("[shared-client] started {}", instance_name);
        Ok(client)
    }

    /// Shut the session down if it is idle past the threshold and unleased.
    fn reap_if_idle(&self) -> bool {
        let taken = {
            let mut slot = self.slot.lock();
            if slot.leases > 0 || slot.last_used.elapsed() < self.idle_timeout {
                return false;
            }
            match std::mem::replace(&mut slot.state, SlotState::Absent) {
                SlotState::Ready(client) => client,
                other => {
                    slot.state = other;
                    return false;
                }
            }
        };
        shutdown_quietly(taken.as_ref(), "idle");
        true
    }
}

fn shutdown_quietly(client: &dyn PullClient, reason: &str) {
    match client.shutdown() {
        Ok(()) => log::debug!(
            "[shared-client] shut down {} ({})",
            client.instance_name(),
            reason
        ),
        Err(e) => log::warn!(
            "[shared-client] shutdown of {} ({}) failed: {}",
            client.instance_name(),
            reason,
            e
        ),
    }
}

/// In-use handle on the shared session.
pub struct SharedClientLease {
    inner: Arc<SharedInner>,
    client: SharedPull,
    generation: u64,
}

impl SharedClientLease {
    pub fn client(&self) -> SharedPull {
        self.client.clone()
    }
}

impl Deref for SharedClientLease {
    type Target = dyn PullClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for SharedClientLease {
    fn drop(&mut self) {
        let mut slot = self.inner.slot.lock();
        if slot.generation == self.generation {
            slot.leases = slot.leases.saturating_sub(1);
            slot.last_used = Instant::now();
        }
    }
}
