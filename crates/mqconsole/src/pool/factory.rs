// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session construction and the pool lifecycle hooks built on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::{AdminClient, ClientConnector, Credential, SessionOptions, SharedAdmin};
use crate::config::ConsoleConfig;
use crate::error::{Error, Result};
use crate::pool::object_pool::PooledObjectFactory;

/// Admin group used by operator-identity sessions.
pub const DEFAULT_ADMIN_GROUP: &str = "mqconsole_admin_group";

static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Timestamp-derived instance name, unique within the process.
///
/// Two sessions sharing an instance name would be merged broker-side, so a
/// sequence number backs up the clock.
pub fn timestamped_instance_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", prefix, nanos, seq)
}

/// Random tag plus access key, used for both instance name and admin group of
/// a credential-scoped session.
pub fn credential_session_tag(access_key: &str) -> String {
    format!("{:016x}@{}", fastrand::u64(..), access_key)
}

/// How a factory names the sessions it builds.
#[derive(Debug, Clone)]
pub enum SessionNaming {
    /// Operator identity: timestamped instance name, shared admin group.
    Operator,
    /// External identity: random tag + access key for instance and group.
    Credential,
}

/// Builds and starts one administrative session.
#[derive(Clone)]
pub struct AdminClientFactory {
    connector: Arc<dyn ClientConnector>,
    config: Arc<ConsoleConfig>,
}

impl AdminClientFactory {
    pub fn new(connector: Arc<dyn ClientConnector>, config: Arc<ConsoleConfig>) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn ClientConnector> {
        &self.connector
    }

    /// Resolve session options for the given identity.
    pub fn session_options(
        &self,
        credential: Option<&Credential>,
        naming: &SessionNaming,
    ) -> SessionOptions {
        let (instance_name, admin_group) = match (naming, credential) {
            (SessionNaming::Credential, Some(cred)) => {
                let tag = credential_session_tag(&cred.access_key);
                (tag.clone(), tag)
            }
            _ => (
                timestamped_instance_name(&self.config.instance_prefix),
                DEFAULT_ADMIN_GROUP.to_string(),
            ),
        };
        self.config
            .session_options(instance_name, admin_group, credential.cloned())
    }

    /// Build and start a session.
    ///
    /// A session that fails to start is shut down before the error is returned.
    pub fn create(
        &self,
        credential: Option<&Credential>,
        naming: &SessionNaming,
    ) -> Result<SharedAdmin> {
        let options = self.session_options(credential, naming);
        let client = self.connector.create_admin(&options)?;

        if let Err(e) = client.start() {
            if let Err(shutdown_err) = client.shutdown() {
                log::debug!(
                    "[pool] shutdown of half-started {} failed: {}",
                    options.instance_name,
                    shutdown_err
                );
            }
            return Err(Error::StartFailure {
                what: format!("admin session {}", options.instance_name),
                source: e,
            });
        }

        log::debug!(
            "[pool] started admin session {} (group {})",
            client.instance_name(),
            client.admin_group()
        );
        Ok(client)
    }
}

/// Pool lifecycle hooks for administrative sessions.
pub struct PooledClientFactory {
    factory: AdminClientFactory,
    credential: Option<Credential>,
    naming: SessionNaming,
}

impl PooledClientFactory {
    /// Sessions under the operator's own identity.
    pub fn operator(factory: AdminClientFactory) -> Self {
        let credential = factory.config().credential.clone();
        Self {
            factory,
            credential,
            naming: SessionNaming::Operator,
        }
    }

    /// Sessions under an external identity.
    pub fn for_credential(factory: AdminClientFactory, credential: Credential) -> Self {
        Self {
            factory,
            credential: Some(credential),
            naming: SessionNaming::Credential,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

impl PooledObjectFactory for PooledClientFactory {
    type Object = dyn AdminClient;

    fn create(&self) -> Result<SharedAdmin> {
        self.factory.create(self.credential.as_ref(), &self.naming)
    }

    fn validate(&self, client: &dyn AdminClient) -> bool {
        match client.cluster_info() {
            Ok(info) if !info.broker_addr_table.is_empty() => true,
            Ok(_) => {
                log::debug!(
                    "[pool] {} probe returned an empty broker table",
                    client.instance_name()
                );
                false
            }
            Err(e) => {
                log::debug!("[pool] {} probe failed: {}", client.instance_name(), e);
                false
            }
        }
    }

    fn destroy(&self, client: SharedAdmin) -> Result<()> {
        client.shutdown()?;
        log::debug!("[pool] shut down admin session {}", client.instance_name());
        Ok(())
    }

    fn describe(&self, client: &dyn AdminClient) -> String {
        client.instance_name().to_string()
    }
}
