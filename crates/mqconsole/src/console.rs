// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-scoped console facade.
//!
//! Owns every pool, the status cache and the shared pull session, with
//! explicit construction and teardown.
//!
//! ```
//! use std::sync::Arc;
//! use mqconsole::{AdminConsole, ConsoleConfig, ThreadBinding};
//! use mqconsole::memory::InMemoryCluster;
//!
//! let cluster = InMemoryCluster::with_default_topology();
//! let console = AdminConsole::new(ConsoleConfig::default(), Arc::new(cluster))?;
//!
//! let brokers = console.run(|| {
//!     let admin = ThreadBinding::current_admin()?;
//!     Ok::<_, mqconsole::Error>(admin.cluster_info()?.broker_addr_table.len())
//! })?;
//! assert_eq!(brokers, 2);
//! # Ok::<(), mqconsole::Error>(())
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::binding::{BindingInterceptor, ThreadBinding};
use crate::client::{AdminClient, ClientConnector, Credential, RemotingClient, SharedAdmin};
use crate::config::ConsoleConfig;
use crate::error::{Error, Result};
use crate::pool::{AdminClientFactory, CredentialPoolRegistry, GlobalClientPool, PoolStats};
use crate::shared::{LazySharedClient, SharedClientLease};
use crate::status::{
    GroupFilter, GroupStatusRecord, StatusCacheBuilder, StatusSnapshot, WorkerStats,
};

/// Point-in-time view of every pool the console owns.
#[derive(Debug, Clone)]
pub struct ConsoleStats {
    pub global: PoolStats,
    pub credentials: Vec<PoolStats>,
    pub workers: WorkerStats,
    pub shared_client_active: bool,
}

/// Administrative core of the broker console.
pub struct AdminConsole {
    config: Arc<ConsoleConfig>,
    interceptor: BindingInterceptor,
    credential_pools: CredentialPoolRegistry,
    status: StatusCacheBuilder,
    shared: LazySharedClient,
    shut_down: AtomicBool,
}

impl AdminConsole {
    /// Validate `config` and build the console. No session is opened until
    /// first use.
    pub fn new(config: ConsoleConfig, connector: Arc<dyn ClientConnector>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let factory = AdminClientFactory::new(connector.clone(), config.clone());
        let global = Arc::new(GlobalClientPool::new(factory.clone(), &config.pool));
        let interceptor = BindingInterceptor::new(global);

        let console = Self {
            credential_pools: CredentialPoolRegistry::new(factory, &config.credential_pool),
            status: StatusCacheBuilder::new(interceptor.clone(), &config.status),
            shared: LazySharedClient::new(connector, config.clone()),
            interceptor,
            config,
            shut_down: AtomicBool::new(false),
        };
        log::debug!(
            "[console] ready (namesrv={:?}, pool max_total={})",
            console.config.namesrv_addrs,
            console.config.pool.max_total
        );
        Ok(console)
    }

    /// Load configuration from a TOML file and build the console.
    pub fn from_config_file<P: AsRef<Path>>(
        path: P,
        connector: Arc<dyn ClientConnector>,
    ) -> Result<Self> {
        Self::new(ConsoleConfig::from_file(path)?, connector)
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::PoolClosed("console".to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operator-identity operations
    // ------------------------------------------------------------------

    /// Run `f` with a global-pool session bound to the calling thread.
    pub fn run<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce() -> std::result::Result<R, E>,
        E: From<Error>,
    {
        self.interceptor.run(f)
    }

    /// Session bound to the calling thread by an enclosing [`run`](Self::run).
    pub fn current_admin(&self) -> Result<SharedAdmin> {
        ThreadBinding::current_admin()
    }

    pub fn current_remoting(&self) -> Result<Option<Arc<dyn RemotingClient>>> {
        ThreadBinding::current_remoting()
    }

    // ------------------------------------------------------------------
    // External-identity operations
    // ------------------------------------------------------------------

    pub fn borrow_admin_for(&self, credential: &Credential) -> Result<SharedAdmin> {
        self.ensure_open()?;
        self.credential_pools.borrow(credential)
    }

    pub fn give_back_admin_for(&self, access_key: &str, client: SharedAdmin) {
        self.credential_pools.give_back(access_key, client);
    }

    /// Run `f` with the credential's dedicated session.
    pub fn run_as<R>(
        &self,
        credential: &Credential,
        f: impl FnOnce(&dyn AdminClient) -> R,
    ) -> Result<R> {
        self.ensure_open()?;
        self.credential_pools.run_as(credential, f)
    }

    /// Drop the pool of one external identity.
    pub fn release_credential(&self, access_key: &str) {
        self.credential_pools.shutdown(access_key);
    }

    // ------------------------------------------------------------------
    // Status cache
    // ------------------------------------------------------------------

    pub fn group_snapshot(&self) -> Result<Arc<StatusSnapshot>> {
        self.ensure_open()?;
        self.status.group_snapshot()
    }

    pub fn query_groups(&self, filter: &GroupFilter) -> Result<Vec<GroupStatusRecord>> {
        self.ensure_open()?;
        self.status.query_groups(filter)
    }

    pub fn refresh_group(&self, group: &str) -> Result<GroupStatusRecord> {
        self.ensure_open()?;
        self.status.refresh_group(group)
    }

    pub fn rebuild_snapshot(&self) -> Result<usize> {
        self.ensure_open()?;
        self.status.rebuild()
    }

    pub fn status_cache(&self) -> &StatusCacheBuilder {
        &self.status
    }

    // ------------------------------------------------------------------
    // Shared pull session
    // ------------------------------------------------------------------

    pub fn shared_pull_client(&self) -> Result<SharedClientLease> {
        self.ensure_open()?;
        self.shared.get()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn pool_stats(&self) -> ConsoleStats {
        ConsoleStats {
            global: self.interceptor.pool().stats(),
            credentials: self.credential_pools.all_stats(),
            workers: self.status.worker_stats(),
            shared_client_active: self.shared.is_active(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the status workers, then close every pool and the shared
    /// session. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.status.shutdown();
        self.credential_pools.shutdown_all();
        self.interceptor.pool().close();
        self.shared.close();
        log::debug!("[console] shut down");
    }
}

impl Drop for AdminConsole {
    fn drop(&mut self) {
        self.shutdown();
    }
}
