// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lower-level client capability.
//!
//! The console never speaks the broker wire protocol itself. It drives
//! sessions through the traits below, which a transport crate (or the
//! [`InMemoryCluster`](crate::memory::InMemoryCluster)) implements.
//!
//! # Session lifecycle
//!
//! ```text
//! ClientConnector::create_admin(opts) -> AdminClient (not started)
//!        |
//!        +-- start()      opens the session, runs cluster discovery
//!        +-- ...queries...
//!        +-- shutdown()   releases network resources (must always run)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared handle to a started administrative session.
pub type SharedAdmin = Arc<dyn AdminClient>;

/// Shared handle to a started pull session.
pub type SharedPull = Arc<dyn PullClient>;

/// Transport failures reported by a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// No route to the target address.
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// The remote side did not answer in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Broker answered with a non-success response code.
    #[error("Broker error (code {code}): {remark}")]
    Broker { code: i32, remark: String },

    /// The group exists but has no live consumer connection.
    #[error("No online consumer in group {0}")]
    ConsumerNotOnline(String),

    /// The queried resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The session was used after shutdown.
    #[error("Session {0} is shut down")]
    Shutdown(String),
}

impl RemoteError {
    /// Transient failures may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_) | RemoteError::Timeout(_))
    }
}

/// External principal on whose behalf operations run.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
}

impl Credential {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Everything a connector needs to build one named session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Unique per live session; collisions make the broker merge sessions.
    pub instance_name: String,
    /// Logical admin group the session registers under.
    pub admin_group: String,
    pub namesrv_addrs: Vec<String>,
    pub credential: Option<Credential>,
    pub timeout: Duration,
    pub vip_channel: bool,
    pub tls: bool,
}

/// Addresses of one broker set, keyed by broker id (0 = master).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerData {
    pub cluster: String,
    pub broker_name: String,
    pub addrs: BTreeMap<u64, String>,
}

impl BrokerData {
    /// Master address, falling back to the lowest-numbered replica.
    pub fn select_addr(&self) -> Option<&str> {
        self.addrs
            .get(&0)
            .or_else(|| self.addrs.values().next())
            .map(String::as_str)
    }
}

/// Cluster topology as reported by the name server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// broker name -> broker data
    pub broker_addr_table: BTreeMap<String, BrokerData>,
    /// cluster name -> broker names
    pub cluster_addr_table: BTreeMap<String, BTreeSet<String>>,
}

/// Per-broker subscription-group configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGroupConfig {
    pub group_name: String,
    pub consume_enable: bool,
    pub consume_message_orderly: bool,
    pub retry_max_times: u32,
}

impl SubscriptionGroupConfig {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            consume_enable: true,
            consume_message_orderly: false,
            retry_max_times: 16,
        }
    }

    pub fn orderly(mut self) -> Self {
        self.consume_message_orderly = true;
        self
    }
}

/// Aggregated consume progress of one group across all its queues.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsumeStats {
    /// Sum over queues of (broker offset - consumer offset).
    pub diff_total: i64,
    pub consume_tps: f64,
}

/// Consume-side delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumeType {
    Push,
    Pull,
}

/// Offset-sharing mode of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageModel {
    Clustering,
    Broadcasting,
}

/// One live consumer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub client_id: String,
    pub client_addr: String,
    pub version: String,
}

/// Live connections of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConnection {
    pub connections: Vec<Connection>,
    pub consume_type: ConsumeType,
    pub message_model: MessageModel,
}

/// Queue identity used by pull sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: u32,
}

/// Raw request/response channel underneath an administrative session.
///
/// Exposed so callers needing a command the admin API does not wrap can
/// reach the transport directly.
pub trait RemotingClient: Send + Sync {
    fn namesrv_addrs(&self) -> Vec<String>;

    fn invoke(
        &self,
        addr: &str,
        request_code: i32,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, RemoteError>;
}

/// One administrative session against the broker cluster.
pub trait AdminClient: Send + Sync {
    fn instance_name(&self) -> &str;

    fn admin_group(&self) -> &str;

    fn start(&self) -> Result<(), RemoteError>;

    fn shutdown(&self) -> Result<(), RemoteError>;

    /// Topology probe; also used as the pool health check.
    fn cluster_info(&self) -> Result<ClusterInfo, RemoteError>;

    /// All subscription groups known to the broker at `broker_addr`.
    fn subscription_groups(
        &self,
        broker_addr: &str,
    ) -> Result<Vec<SubscriptionGroupConfig>, RemoteError>;

    /// Single-group lookup on one broker.
    fn subscription_group(
        &self,
        broker_addr: &str,
        group: &str,
    ) -> Result<Option<SubscriptionGroupConfig>, RemoteError>;

    fn consume_stats(&self, group: &str) -> Result<ConsumeStats, RemoteError>;

    fn consumer_connection(&self, group: &str) -> Result<ConsumerConnection, RemoteError>;

    /// Transport handle underneath this session, if the implementation has one.
    fn remoting(&self) -> Option<Arc<dyn RemotingClient>> {
        None
    }
}

/// Long-lived pull session used for infrequent message lookups.
pub trait PullClient: Send + Sync {
    fn instance_name(&self) -> &str;

    fn start(&self) -> Result<(), RemoteError>;

    fn shutdown(&self) -> Result<(), RemoteError>;

    fn fetch_subscribe_queues(&self, topic: &str) -> Result<Vec<MessageQueue>, RemoteError>;
}

/// Named, credential-bindable session constructor.
///
/// Implementations return sessions that are built but not yet started.
pub trait ClientConnector: Send + Sync {
    fn create_admin(&self, options: &SessionOptions) -> Result<SharedAdmin, RemoteError>;

    fn create_pull(&self, options: &SessionOptions) -> Result<SharedPull, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_hides_secret() {
        let cred = Credential::new("tenant-a", "s3cr3t");
        let printed = format!("{:?}", cred);
        assert!(printed.contains("tenant-a"));
        assert!(!printed.contains("s3cr3t"));
    }

    #[test]
    fn test_select_addr_prefers_master() {
        let mut data = BrokerData {
            cluster: "DefaultCluster".into(),
            broker_name: "broker-a".into(),
            addrs: BTreeMap::new(),
        };
        assert_eq!(data.select_addr(), None);

        data.addrs.insert(2, "10.0.0.3:10911".into());
        data.addrs.insert(1, "10.0.0.2:10911".into());
        assert_eq!(data.select_addr(), Some("10.0.0.2:10911"));

        data.addrs.insert(0, "10.0.0.1:10911".into());
        assert_eq!(data.select_addr(), Some("10.0.0.1:10911"));
    }
}
