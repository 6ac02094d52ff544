// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-credential capacity-1 pools.
//!
//! # Architecture
//!
//! ```text
//! CredentialPoolRegistry
//! +-- pools: DashMap<access_key, Arc<ObjectPool>>   (max_total = 1 each)
//! +-- sweeper: one PeriodicTask running evict() over every pool
//! ```
//!
//! Every operation under one external identity goes through that identity's
//! single session, so those operations are totally ordered. Different
//! identities never share a pool and never wait on each other.
//!
//! Pools are keyed by access key only; a second secret for the same key
//! reuses the pool built with the first.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::background::PeriodicTask;
use crate::client::{AdminClient, Credential, SharedAdmin};
use crate::config::CredentialPoolConfig;
use crate::error::{Error, Result};
use crate::pool::factory::{AdminClientFactory, PooledClientFactory};
use crate::pool::object_pool::{ObjectPool, PoolSettings, PoolStats};

type CredentialPool = ObjectPool<PooledClientFactory>;
type PoolMap = DashMap<String, Arc<CredentialPool>>;

/// Lazily-built map from access key to a dedicated single-session pool.
///
/// Pools carry no sweep thread of their own; one registry-wide task sweeps
/// them all.
pub struct CredentialPoolRegistry {
    factory: AdminClientFactory,
    max_wait: Duration,
    pools: Arc<PoolMap>,
    _sweeper: PeriodicTask,
}

impl CredentialPoolRegistry {
    pub fn new(factory: AdminClientFactory, config: &CredentialPoolConfig) -> Self {
        let pools: Arc<PoolMap> = Arc::new(DashMap::new());
        let weak: Weak<PoolMap> = Arc::downgrade(&pools);
        let sweeper = PeriodicTask::spawn(
            "credential-pool-evictor",
            Duration::from_millis(config.eviction_interval_ms),
            move || match weak.upgrade() {
                Some(pools) => {
                    sweep(&pools);
                    true
                }
                None => false,
            },
        );

        Self {
            factory,
            max_wait: Duration::from_millis(config.max_wait_ms),
            pools,
            _sweeper: sweeper,
        }
    }

    fn build_pool(&self, credential: &Credential) -> CredentialPool {
        let settings = PoolSettings::single(
            format!("credential:{}", credential.access_key),
            self.max_wait,
        );
        ObjectPool::new(
            PooledClientFactory::for_credential(self.factory.clone(), credential.clone()),
            settings,
        )
    }

    /// Existing pool for the key, or a freshly installed one.
    ///
    /// When two callers race to install, the loser closes its pool and uses
    /// the winner's.
    fn pool_for(&self, credential: &Credential) -> Arc<CredentialPool> {
        if let Some(pool) = self.pools.get(&credential.access_key) {
            return pool.clone();
        }

        let fresh = Arc::new(self.build_pool(credential));
        match self.pools.entry(credential.access_key.clone()) {
            Entry::Occupied(existing) => {
                let winner = existing.get().clone();
                drop(existing);
                fresh.close();
                log::debug!(
                    "[credential-pool] lost install race for {}, using existing pool",
                    credential.access_key
                );
                winner
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh.clone());
                log::debug!(
                    "[credential-pool] installed pool for {}",
                    credential.access_key
                );
                fresh
            }
        }
    }

    /// Borrow the credential's session, building its pool on first use.
    ///
    /// Blocks up to the configured max-wait while another operation under the
    /// same credential holds the session.
    pub fn borrow(&self, credential: &Credential) -> Result<SharedAdmin> {
        self.pool_for(credential).borrow()
    }

    /// Return a session borrowed with [`borrow`](Self::borrow).
    ///
    /// If the session cannot go back to its pool (unknown key, closed pool,
    /// foreign session) it is shut down directly so it never dangles.
    pub fn give_back(&self, access_key: &str, client: SharedAdmin) {
        let pool = self.pools.get(access_key).map(|p| p.clone());
        let fallback = client.clone();

        let outcome = match pool {
            Some(pool) => pool.give_back(client),
            None => Err(Error::PoolClosed(format!(
                "credential:{}",
                access_key
            ))),
        };

        if let Err(e) = outcome {
            log::warn!(
                "[credential-pool] return of {} for {} failed ({}), shutting it down",
                fallback.instance_name(),
                access_key,
                e
            );
            if let Err(shutdown_err) = fallback.shutdown() {
                log::warn!(
                    "[credential-pool] forced shutdown of {} failed: {}",
                    fallback.instance_name(),
                    shutdown_err
                );
            }
        }
    }

    /// Run `f` with the credential's session, always giving it back.
    pub fn run_as<R>(
        &self,
        credential: &Credential,
        f: impl FnOnce(&dyn AdminClient) -> R,
    ) -> Result<R> {
        let client = self.borrow(credential)?;
        let _guard = ReturnOnDrop {
            registry: self,
            access_key: &credential.access_key,
            client: Some(client.clone()),
        };
        Ok(f(client.as_ref()))
    }

    /// Close and remove the pool for one access key.
    pub fn shutdown(&self, access_key: &str) {
        if let Some((_, pool)) = self.pools.remove(access_key) {
            pool.close();
            log::debug!("[credential-pool] shut down pool for {}", access_key);
        }
    }

    /// Close and remove every credential pool.
    pub fn shutdown_all(&self) {
        let keys: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.shutdown(&key);
        }
    }

    pub fn contains(&self, access_key: &str) -> bool {
        self.pools.contains_key(access_key)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn stats(&self, access_key: &str) -> Option<PoolStats> {
        self.pools.get(access_key).map(|p| p.stats())
    }

    /// Sweep every credential pool now; returns the sessions destroyed.
    pub fn evict_all(&self) -> usize {
        sweep(&self.pools)
    }

    /// Stats of every live credential pool, ordered by pool name.
    pub fn all_stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<PoolStats> = self.pools.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

impl Drop for CredentialPoolRegistry {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

/// Evict idle sessions in every pool without holding map shards meanwhile.
fn sweep(pools: &PoolMap) -> usize {
    let snapshot: Vec<Arc<CredentialPool>> = pools.iter().map(|e| e.value().clone()).collect();
    snapshot.iter().map(|pool| pool.evict()).sum()
}

struct ReturnOnDrop<'a> {
    registry: &'a CredentialPoolRegistry,
    access_key: &'a str,
    client: Option<SharedAdmin>,
}

impl Drop for ReturnOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.registry.give_back(self.access_key, client);
        }
    }
}
