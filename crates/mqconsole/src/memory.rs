// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker cluster.
//!
//! Implements [`ClientConnector`] over scripted topology and group state, for
//! local development and tests. Besides data it supports failure injection
//! (per group, per broker, per session probe, session start/shutdown) and
//! exposes session lifecycle counters.
//!
//! ```
//! use mqconsole::memory::InMemoryCluster;
//! use mqconsole::client::SubscriptionGroupConfig;
//!
//! let cluster = InMemoryCluster::with_default_topology();
//! cluster
//!     .add_group("10.0.0.1:10911", SubscriptionGroupConfig::new("orders"))
//!     .set_subscribers("orders", 3)
//!     .set_backlog("orders", 120);
//! ```

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{
    AdminClient, BrokerData, ClientConnector, ClusterInfo, Connection, ConsumeStats,
    ConsumeType, ConsumerConnection, MessageModel, MessageQueue, PullClient, RemoteError,
    RemotingClient, SessionOptions, SharedAdmin, SharedPull, SubscriptionGroupConfig,
};

/// Response code used for injected broker failures.
pub const INJECTED_FAILURE_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionKind {
    Admin,
    Pull,
}

#[derive(Debug)]
struct SessionRecord {
    kind: SessionKind,
    started: bool,
    shut_down: bool,
}

#[derive(Default)]
struct ClusterState {
    topology: ClusterInfo,
    /// broker addr -> group name -> config
    groups: BTreeMap<String, BTreeMap<String, SubscriptionGroupConfig>>,
    stats: HashMap<String, ConsumeStats>,
    connections: HashMap<String, ConsumerConnection>,
    /// topic -> queues per broker
    topics: BTreeMap<String, u32>,
    failing_groups: HashSet<String>,
    failing_brokers: HashSet<String>,
    poisoned: HashSet<String>,
    query_delay: Duration,
    fail_starts: bool,
    fail_shutdowns: bool,
    sessions: HashMap<String, SessionRecord>,
}

/// Scripted cluster shared by every session it creates.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<RwLock<ClusterState>>,
}

impl InMemoryCluster {
    /// Cluster with no brokers.
    pub fn new() -> Self {
        Self::default()
    }

    /// `DefaultCluster` with `broker-a` (10.0.0.1:10911) and `broker-b`
    /// (10.0.0.2:10911).
    pub fn with_default_topology() -> Self {
        let cluster = Self::new();
        cluster
            .add_broker("DefaultCluster", "broker-a", "10.0.0.1:10911")
            .add_broker("DefaultCluster", "broker-b", "10.0.0.2:10911");
        cluster
    }

    /// Register a broker master address.
    pub fn add_broker(&self, cluster: &str, broker_name: &str, addr: &str) -> &Self {
        let mut state = self.state.write();
        let data = state
            .topology
            .broker_addr_table
            .entry(broker_name.to_string())
            .or_insert_with(|| BrokerData {
                cluster: cluster.to_string(),
                broker_name: broker_name.to_string(),
                addrs: BTreeMap::new(),
            });
        data.addrs.insert(0, addr.to_string());
        state
            .topology
            .cluster_addr_table
            .entry(cluster.to_string())
            .or_default()
            .insert(broker_name.to_string());
        state.groups.entry(addr.to_string()).or_default();
        drop(state);
        self
    }

    /// Declare a subscription group on one broker.
    pub fn add_group(&self, broker_addr: &str, config: SubscriptionGroupConfig) -> &Self {
        self.state
            .write()
            .groups
            .entry(broker_addr.to_string())
            .or_default()
            .insert(config.group_name.clone(), config);
        self
    }

    /// Give a group `count` clustering push consumers.
    pub fn set_subscribers(&self, group: &str, count: usize) -> &Self {
        let connections = (0..count)
            .map(|i| Connection {
                client_id: format!("{}@client-{}", group, i),
                client_addr: format!("192.168.0.{}:{}", 10 + i, 50_000 + i),
                version: "V5_1_4".to_string(),
            })
            .collect();
        self.set_connection(
            group,
            ConsumerConnection {
                connections,
                consume_type: ConsumeType::Push,
                message_model: MessageModel::Clustering,
            },
        )
    }

    pub fn set_connection(&self, group: &str, connection: ConsumerConnection) -> &Self {
        self.state
            .write()
            .connections
            .insert(group.to_string(), connection);
        self
    }

    /// Drop all live connections of a group (queries then report it offline).
    pub fn clear_connection(&self, group: &str) -> &Self {
        self.state.write().connections.remove(group);
        self
    }

    pub fn set_backlog(&self, group: &str, diff_total: i64) -> &Self {
        self.state
            .write()
            .stats
            .entry(group.to_string())
            .or_default()
            .diff_total = diff_total;
        self
    }

    pub fn set_consume_stats(&self, group: &str, stats: ConsumeStats) -> &Self {
        self.state.write().stats.insert(group.to_string(), stats);
        self
    }

    pub fn add_topic(&self, topic: &str, queues_per_broker: u32) -> &Self {
        self.state
            .write()
            .topics
            .insert(topic.to_string(), queues_per_broker);
        self
    }

    /// Make consume-stats queries for `group` fail.
    pub fn fail_group(&self, group: &str) -> &Self {
        self.state.write().failing_groups.insert(group.to_string());
        self
    }

    /// Make subscription-group listing on `broker_addr` fail.
    pub fn fail_broker(&self, broker_addr: &str) -> &Self {
        self.state
            .write()
            .failing_brokers
            .insert(broker_addr.to_string());
        self
    }

    /// Delay applied to every consume-stats query.
    pub fn set_query_delay(&self, delay: Duration) -> &Self {
        self.state.write().query_delay = delay;
        self
    }

    /// Make the topology probe of one session fail.
    pub fn poison(&self, instance_name: &str) -> &Self {
        self.state.write().poisoned.insert(instance_name.to_string());
        self
    }

    pub fn fail_starts(&self, fail: bool) -> &Self {
        self.state.write().fail_starts = fail;
        self
    }

    pub fn fail_shutdowns(&self, fail: bool) -> &Self {
        self.state.write().fail_shutdowns = fail;
        self
    }

    fn count(&self, kind: SessionKind, live_only: bool) -> usize {
        self.state
            .read()
            .sessions
            .values()
            .filter(|s| s.kind == kind && s.started && (!live_only || !s.shut_down))
            .count()
    }

    /// Admin sessions ever started.
    pub fn admin_sessions_started(&self) -> usize {
        self.count(SessionKind::Admin, false)
    }

    /// Admin sessions started and not yet shut down.
    pub fn admin_sessions_live(&self) -> usize {
        self.count(SessionKind::Admin, true)
    }

    pub fn pull_sessions_started(&self) -> usize {
        self.count(SessionKind::Pull, false)
    }

    pub fn pull_sessions_live(&self) -> usize {
        self.count(SessionKind::Pull, true)
    }

    pub fn is_shut_down(&self, instance_name: &str) -> bool {
        self.state
            .read()
            .sessions
            .get(instance_name)
            .is_some_and(|s| s.shut_down)
    }

    fn register(&self, name: &str, kind: SessionKind) -> Result<(), RemoteError> {
        let mut state = self.state.write();
        if state.sessions.contains_key(name) {
            return Err(RemoteError::Broker {
                code: 1,
                remark: format!("instance name {} already in use", name),
            });
        }
        state.sessions.insert(
            name.to_string(),
            SessionRecord {
                kind,
                started: false,
                shut_down: false,
            },
        );
        Ok(())
    }

    fn start_session(&self, name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.write();
        if state.fail_starts {
            return Err(RemoteError::Unreachable(format!(
                "name server refused session {}",
                name
            )));
        }
        match state.sessions.get_mut(name) {
            Some(record) if !record.shut_down => {
                record.started = true;
                Ok(())
            }
            _ => Err(RemoteError::Shutdown(name.to_string())),
        }
    }

    fn shutdown_session(&self, name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.write();
        if state.fail_shutdowns {
            return Err(RemoteError::Broker {
                code: INJECTED_FAILURE_CODE,
                remark: format!("shutdown of {} refused", name),
            });
        }
        if let Some(record) = state.sessions.get_mut(name) {
            record.shut_down = true;
        }
        Ok(())
    }

    fn ensure_live(&self, name: &str) -> Result<(), RemoteError> {
        match self.state.read().sessions.get(name) {
            Some(record) if record.started && !record.shut_down => Ok(()),
            _ => Err(RemoteError::Shutdown(name.to_string())),
        }
    }
}

impl ClientConnector for InMemoryCluster {
    fn create_admin(&self, options: &SessionOptions) -> Result<SharedAdmin, RemoteError> {
        self.register(&options.instance_name, SessionKind::Admin)?;
        Ok(Arc::new(MemoryAdminSession {
            name: options.instance_name.clone(),
            group: options.admin_group.clone(),
            cluster: self.clone(),
            remoting: Arc::new(MemoryRemoting {
                session: options.instance_name.clone(),
                namesrv_addrs: options.namesrv_addrs.clone(),
                cluster: self.clone(),
            }),
        }))
    }

    fn create_pull(&self, options: &SessionOptions) -> Result<SharedPull, RemoteError> {
        self.register(&options.instance_name, SessionKind::Pull)?;
        Ok(Arc::new(MemoryPullSession {
            name: options.instance_name.clone(),
            cluster: self.clone(),
        }))
    }
}

struct MemoryAdminSession {
    name: String,
    group: String,
    cluster: InMemoryCluster,
    remoting: Arc<MemoryRemoting>,
}

impl AdminClient for MemoryAdminSession {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn admin_group(&self) -> &str {
        &self.group
    }

    fn start(&self) -> Result<(), RemoteError> {
        self.cluster.start_session(&self.name)
    }

    fn shutdown(&self) -> Result<(), RemoteError> {
        self.cluster.shutdown_session(&self.name)
    }

    fn cluster_info(&self) -> Result<ClusterInfo, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        let state = self.cluster.state.read();
        if state.poisoned.contains(&self.name) {
            return Err(RemoteError::Timeout(format!(
                "topology probe from {}",
                self.name
            )));
        }
        Ok(state.topology.clone())
    }

    fn subscription_groups(
        &self,
        broker_addr: &str,
    ) -> Result<Vec<SubscriptionGroupConfig>, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        let state = self.cluster.state.read();
        if state.failing_brokers.contains(broker_addr) {
            return Err(RemoteError::Unreachable(broker_addr.to_string()));
        }
        state
            .groups
            .get(broker_addr)
            .map(|groups| groups.values().cloned().collect())
            .ok_or_else(|| RemoteError::Unreachable(broker_addr.to_string()))
    }

    fn subscription_group(
        &self,
        broker_addr: &str,
        group: &str,
    ) -> Result<Option<SubscriptionGroupConfig>, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        let state = self.cluster.state.read();
        if state.failing_brokers.contains(broker_addr) {
            return Err(RemoteError::Unreachable(broker_addr.to_string()));
        }
        Ok(state
            .groups
            .get(broker_addr)
            .and_then(|groups| groups.get(group))
            .cloned())
    }

    fn consume_stats(&self, group: &str) -> Result<ConsumeStats, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        let delay = self.cluster.state.read().query_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let state = self.cluster.state.read();
        if state.failing_groups.contains(group) {
            return Err(RemoteError::Broker {
                code: INJECTED_FAILURE_CODE,
                remark: format!("consume stats unavailable for {}", group),
            });
        }
        Ok(state.stats.get(group).copied().unwrap_or_default())
    }

    fn consumer_connection(&self, group: &str) -> Result<ConsumerConnection, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        self.cluster
            .state
            .read()
            .connections
            .get(group)
            .cloned()
            .ok_or_else(|| RemoteError::ConsumerNotOnline(group.to_string()))
    }

    fn remoting(&self) -> Option<Arc<dyn RemotingClient>> {
        Some(self.remoting.clone())
    }
}

struct MemoryRemoting {
    session: String,
    namesrv_addrs: Vec<String>,
    cluster: InMemoryCluster,
}

impl RemotingClient for MemoryRemoting {
    fn namesrv_addrs(&self) -> Vec<String> {
        self.namesrv_addrs.clone()
    }

    /// Echoes the request body back.
    fn invoke(
        &self,
        addr: &str,
        _request_code: i32,
        body: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, RemoteError> {
        self.cluster.ensure_live(&self.session)?;
        if self.cluster.state.read().failing_brokers.contains(addr) {
            return Err(RemoteError::Unreachable(addr.to_string()));
        }
        Ok(body.to_vec())
    }
}

struct MemoryPullSession {
    name: String,
    cluster: InMemoryCluster,
}

impl PullClient for MemoryPullSession {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), RemoteError> {
        self.cluster.start_session(&self.name)
    }

    fn shutdown(&self) -> Result<(), RemoteError> {
        self.cluster.shutdown_session(&self.name)
    }

    fn fetch_subscribe_queues(&self, topic: &str) -> Result<Vec<MessageQueue>, RemoteError> {
        self.cluster.ensure_live(&self.name)?;
        let state = self.cluster.state.read();
        let per_broker = *state
            .topics
            .get(topic)
            .ok_or_else(|| RemoteError::NotFound(topic.to_string()))?;

        Ok(state
            .topology
            .broker_addr_table
            .keys()
            .flat_map(|broker| {
                (0..per_broker).map(move |queue_id| MessageQueue {
                    topic: topic.to_string(),
                    broker_name: broker.clone(),
                    queue_id,
                })
            })
            .collect())
    }
}
