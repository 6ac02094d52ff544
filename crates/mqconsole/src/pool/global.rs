// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pool of sessions authenticated as the operator's own identity.

use crate::client::{AdminClient, SharedAdmin};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::pool::factory::{AdminClientFactory, PooledClientFactory};
use crate::pool::object_pool::{ObjectPool, PoolSettings, PoolStats};

/// Bounded pool used by most administrative operations.
pub struct GlobalClientPool {
    pool: ObjectPool<PooledClientFactory>,
}

impl GlobalClientPool {
    pub const NAME: &'static str = "global";

    pub fn new(factory: AdminClientFactory, config: &PoolConfig) -> Self {
        let settings = PoolSettings {
            name: Self::NAME.to_string(),
            max_total: config.max_total,
            max_idle: config.max_idle,
            min_idle: config.min_idle,
            max_wait: config.max_wait(),
            eviction_interval: Some(config.eviction_interval()),
            min_evictable_idle: config.min_evictable_idle(),
            test_on_borrow: config.test_on_borrow,
            test_while_idle: config.test_while_idle,
        };
        Self {
            pool: ObjectPool::new(PooledClientFactory::operator(factory), settings),
        }
    }

    /// Borrow a started session; blocks up to the configured max-wait.
    pub fn borrow(&self) -> Result<SharedAdmin> {
        self.pool.borrow()
    }

    pub fn give_back(&self, client: SharedAdmin) -> Result<()> {
        self.pool.give_back(client)
    }

    /// Topology probe used by the idle sweep.
    pub fn validate(&self, client: &(dyn AdminClient + 'static)) -> bool {
        self.pool.validate(client)
    }

    /// Destroy a borrowed session instead of returning it.
    pub fn invalidate(&self, client: SharedAdmin) -> Result<()> {
        self.pool.invalidate(client)
    }

    /// Run the idle sweep now; returns the number of sessions destroyed.
    pub fn evict(&self) -> usize {
        self.pool.evict()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
