// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-group status cache.
//!
//! # Rebuild
//!
//! ```text
//! discovery (caller thread, bound session)
//!   cluster_info -> per broker: subscription_groups -> union by name
//!        |
//!        v
//! fan-out: one task per group on WorkerPool (each task binds its own session)
//!   consume_stats + consumer_connection + classification -> record
//!        |
//!        v
//! latch join -> sort -> ArcSwap::store (readers never see a partial set)
//! ```
//!
//! A task that fails is logged and its group left out. Reads while a rebuild
//! runs fail fast with [`Error::BuildInProgress`].

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::binding::{BindingInterceptor, ThreadBinding};
use crate::client::{AdminClient, RemoteError, SubscriptionGroupConfig};
use crate::config::StatusConfig;
use crate::error::{Error, Result};
use crate::status::record::{
    GroupFilter, GroupKind, GroupStatusRecord, SharedSnapshot, StatusSnapshot,
};
use crate::status::workers::{CountDownLatch, WorkerPool, WorkerStats};

/// What discovery learned about one group.
#[derive(Debug, Clone, Default)]
struct DiscoveredGroup {
    broker_addrs: BTreeSet<String>,
    config: Option<SubscriptionGroupConfig>,
}

/// Clears the building flag on every exit path.
struct BuildingFlag<'a>(&'a AtomicBool);

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builds and serves the consumer-group snapshot.
pub struct StatusCacheBuilder {
    interceptor: BindingInterceptor,
    workers: WorkerPool,
    join_timeout: Option<Duration>,
    snapshot: ArcSwap<StatusSnapshot>,
    building: AtomicBool,
    build_lock: Mutex<()>,
}

impl StatusCacheBuilder {
    pub fn new(interceptor: BindingInterceptor, config: &StatusConfig) -> Self {
        Self {
            interceptor,
            workers: WorkerPool::new(
                "status-worker",
                config.effective_workers(),
                config.queue_capacity,
            ),
            join_timeout: config.join_timeout(),
            snapshot: ArcSwap::from_pointee(StatusSnapshot::default()),
            building: AtomicBool::new(false),
            build_lock: Mutex::new(()),
        }
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Completion time of the last published rebuild.
    pub fn last_built(&self) -> Option<SystemTime> {
        self.snapshot.load().built_at()
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.workers.stats()
    }

    /// Stop the fan-out workers. Later rebuilds fail with
    /// [`Error::PoolClosed`]; the last snapshot is kept.
    pub fn shutdown(&self) {
        self.workers.shutdown();
    }

    /// Current snapshot.
    ///
    /// Fails with [`Error::BuildInProgress`] while a rebuild runs. The first
    /// read before any rebuild builds synchronously.
    pub fn group_snapshot(&self) -> Result<SharedSnapshot> {
        if self.is_building() {
            return Err(Error::BuildInProgress);
        }
        if self.last_built().is_none() {
            self.rebuild()?;
        }
        Ok(self.snapshot.load_full())
    }

    /// Snapshot narrowed by `filter`.
    pub fn query_groups(&self, filter: &GroupFilter) -> Result<Vec<GroupStatusRecord>> {
        Ok(self.group_snapshot()?.filtered(filter))
    }

    /// Rebuild and publish the whole snapshot; returns the record count.
    ///
    /// Fails with [`Error::BuildInProgress`] if another rebuild holds the
    /// guard, and with the discovery error if the topology cannot be read.
    /// The previous snapshot stays published on failure.
    pub fn rebuild(&self) -> Result<usize> {
        let Some(_guard) = self.build_lock.try_lock() else {
            return Err(Error::BuildInProgress);
        };
        if self.workers.is_shut_down() {
            return Err(Error::PoolClosed("status-worker".to_string()));
        }
        self.building.store(true, Ordering::Release);
        let _flag = BuildingFlag(&self.building);

        let started = Instant::now();
        let discovered = self
            .interceptor
            .with_admin(|admin| Ok(discover_groups(admin)?))?;
        let total = discovered.len();

        let records = self.fan_out(discovered);
        let count = records.len();
        self.snapshot
            .store(Arc::new(StatusSnapshot::new(records, SystemTime::now())));

        log::debug!(
            "[status] rebuilt snapshot: {} of {} groups in {:?}",
            count,
            total,
            started.elapsed()
        );
        Ok(count)
    }

    fn fan_out(&self, discovered: BTreeMap<String, DiscoveredGroup>) -> Vec<GroupStatusRecord> {
        let latch = CountDownLatch::new(discovered.len());
        let results = Arc::new(Mutex::new(Vec::with_capacity(discovered.len())));

        for (group, found) in discovered {
            let guard = latch.guard();
            let interceptor = self.interceptor.clone();
            let results = results.clone();
            self.workers.submit(move || {
                let _done = guard;
                let outcome = interceptor.run(|| {
                    let admin = ThreadBinding::current_admin()?;
                    collect_record(admin.as_ref(), &group, &found)
                });
                match outcome {
                    Ok(record) => results.lock().push(record),
                    Err(e) => log::warn!("[status] skipping group {}: {}", group, e),
                }
            });
        }

        match self.join_timeout {
            Some(timeout) => {
                if !latch.wait_timeout(timeout) {
                    log::warn!(
                        "[status] join timed out after {:?}, {} tasks still pending",
                        timeout,
                        latch.count()
                    );
                }
            }
            None => latch.wait(),
        }

        let mut results = results.lock();
        std::mem::take(&mut *results)
    }

    /// Re-query one group and replace its record in place.
    ///
    /// Fails with [`Error::SnapshotUnavailable`] before the first rebuild and
    /// [`Error::GroupNotFound`] if the group is not in the snapshot.
    pub fn refresh_group(&self, group: &str) -> Result<GroupStatusRecord> {
        let current = self.snapshot.load_full();
        if current.is_empty() {
            return Err(Error::SnapshotUnavailable);
        }
        let existing = current
            .get(group)
            .ok_or_else(|| Error::GroupNotFound(group.to_string()))?;

        let found = DiscoveredGroup {
            broker_addrs: existing.broker_addrs.clone(),
            config: None,
        };
        let record = self
            .interceptor
            .with_admin(|admin| collect_record(admin, group, &found))?;

        let mut replaced = false;
        self.snapshot.rcu(|snapshot| match snapshot.with_replaced(record.clone()) {
            Some(next) => {
                replaced = true;
                Arc::new(next)
            }
            None => {
                replaced = false;
                snapshot.clone()
            }
        });
        if !replaced {
            // A rebuild published without this group meanwhile.
            return Err(Error::GroupNotFound(group.to_string()));
        }

        log::debug!("[status] refreshed group {}", group);
        Ok(record)
    }
}

/// Union of subscription groups over every broker in the topology.
///
/// A broker whose group table cannot be read is skipped.
fn discover_groups(
    admin: &dyn AdminClient,
) -> std::result::Result<BTreeMap<String, DiscoveredGroup>, RemoteError> {
    let topology = admin.cluster_info()?;
    let mut groups: BTreeMap<String, DiscoveredGroup> = BTreeMap::new();

    for broker in topology.broker_addr_table.values() {
        let Some(addr) = broker.select_addr() else {
            continue;
        };
        let configs = match admin.subscription_groups(addr) {
            Ok(configs) => configs,
            Err(e) => {
                log::warn!(
                    "[status] cannot list groups on {} ({}): {}",
                    broker.broker_name,
                    addr,
                    e
                );
                continue;
            }
        };
        for config in configs {
            let entry = groups.entry(config.group_name.clone()).or_default();
            entry.broker_addrs.insert(addr.to_string());
            if entry.config.is_none() {
                entry.config = Some(config);
            }
        }
    }

    Ok(groups)
}

/// Query one group and assemble its record.
fn collect_record(
    admin: &dyn AdminClient,
    group: &str,
    found: &DiscoveredGroup,
) -> Result<GroupStatusRecord> {
    let stats = admin.consume_stats(group)?;
    let connection = match admin.consumer_connection(group) {
        Ok(connection) => Some(connection),
        Err(RemoteError::ConsumerNotOnline(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let config = match &found.config {
        Some(config) => Some(config.clone()),
        None => lookup_config(admin, group, &found.broker_addrs),
    };

    Ok(GroupStatusRecord {
        group: group.to_string(),
        subscribers: connection.as_ref().map_or(0, |c| c.connections.len()),
        backlog: stats.diff_total,
        kind: GroupKind::classify(group, config.as_ref()),
        broker_addrs: found.broker_addrs.clone(),
        consume_tps: stats.consume_tps,
        consume_type: connection.as_ref().map(|c| c.consume_type),
        message_model: connection.as_ref().map(|c| c.message_model),
        version: connection
            .as_ref()
            .and_then(|c| c.connections.first())
            .map(|c| c.version.clone()),
        updated_at: SystemTime::now(),
    })
}

/// First subscription config any of the group's brokers reports.
fn lookup_config(
    admin: &dyn AdminClient,
    group: &str,
    broker_addrs: &BTreeSet<String>,
) -> Option<SubscriptionGroupConfig> {
    for addr in broker_addrs {
        match admin.subscription_group(addr, group) {
            Ok(Some(config)) => return Some(config),
            Ok(None) => {}
            Err(e) => log::debug!("[status] config lookup for {} on {} failed: {}", group, addr, e),
        }
    }
    None
}
