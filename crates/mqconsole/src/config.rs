// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Console configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! namesrv_addrs = ["10.0.0.1:9876", "10.0.0.2:9876"]
//! timeout_ms = 5000
//!
//! [credential]
//! access_key = "console"
//! secret_key = "console-secret"
//!
//! [pool]
//! max_total = 64
//! max_wait_ms = 10000
//!
//! [status]
//! worker_threads = 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::client::{Credential, SessionOptions};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Name server addresses sessions connect to.
    #[serde(default = "default_namesrv_addrs")]
    pub namesrv_addrs: Vec<String>,

    /// Prefix for generated session instance names.
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,

    /// Per-call timeout handed to every session (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub vip_channel: bool,

    #[serde(default)]
    pub tls: bool,

    /// Operator credential used by the global pool and the shared client.
    #[serde(default)]
    pub credential: Option<Credential>,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub credential_pool: CredentialPoolConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub shared_client: SharedClientConfig,
}

/// Global pool tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    #[serde(default)]
    pub min_idle: usize,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Idle sweep interval (milliseconds).
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,

    /// Idle entries older than this (and above `min_idle`) are destroyed by
    /// the sweep. 0 disables age-based eviction.
    #[serde(default)]
    pub min_evictable_idle_ms: u64,

    #[serde(default)]
    pub test_on_borrow: bool,

    #[serde(default = "default_true")]
    pub test_while_idle: bool,
}

/// Tunables shared by every credential-scoped pool.
///
/// Capacity is fixed at one client per credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPoolConfig {
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,
}

/// Status cache builder tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Fan-out worker count; 0 means twice the available cores.
    #[serde(default)]
    pub worker_threads: usize,

    /// Pending task capacity; the oldest task is discarded on overflow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on the fan-out join (milliseconds); 0 waits for every task.
    #[serde(default)]
    pub join_timeout_ms: u64,
}

/// Lazy shared pull client tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedClientConfig {
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

fn default_namesrv_addrs() -> Vec<String> {
    vec!["127.0.0.1:9876".to_string()]
}

fn default_instance_prefix() -> String {
    "mqconsole".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_max_total() -> usize {
    128
}

fn default_max_idle() -> usize {
    16
}

fn default_max_wait_ms() -> u64 {
    10_000
}

fn default_eviction_interval_ms() -> u64 {
    20_000
}

fn default_queue_capacity() -> usize {
    5_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_reap_interval_ms() -> u64 {
    30_000
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            namesrv_addrs: default_namesrv_addrs(),
            instance_prefix: default_instance_prefix(),
            timeout_ms: default_timeout_ms(),
            vip_channel: false,
            tls: false,
            credential: None,
            pool: PoolConfig::default(),
            credential_pool: CredentialPoolConfig::default(),
            status: StatusConfig::default(),
            shared_client: SharedClientConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: default_max_total(),
            max_idle: default_max_idle(),
            min_idle: 0,
            max_wait_ms: default_max_wait_ms(),
            eviction_interval_ms: default_eviction_interval_ms(),
            min_evictable_idle_ms: 0,
            test_on_borrow: false,
            test_while_idle: true,
        }
    }
}

impl Default for CredentialPoolConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            eviction_interval_ms: default_eviction_interval_ms(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: default_queue_capacity(),
            join_timeout_ms: 0,
        }
    }
}

impl Default for SharedClientConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namesrv_addrs.is_empty() || self.namesrv_addrs.iter().any(|a| a.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "namesrv_addrs must list at least one non-empty address".into(),
            ));
        }

        if self.instance_prefix.is_empty() {
            return Err(ConfigError::Invalid("instance_prefix is empty".into()));
        }

        if let Some(cred) = &self.credential {
            if cred.access_key.is_empty() || cred.secret_key.is_empty() {
                return Err(ConfigError::Invalid(
                    "credential requires both access_key and secret_key".into(),
                ));
            }
        }

        let pool = &self.pool;
        if pool.max_total == 0 {
            return Err(ConfigError::Invalid("pool.max_total must be >= 1".into()));
        }
        if pool.max_idle > pool.max_total {
            return Err(ConfigError::Invalid(format!(
                "pool.max_idle ({}) exceeds pool.max_total ({})",
                pool.max_idle, pool.max_total
            )));
        }
        if pool.min_idle > pool.max_idle {
            return Err(ConfigError::Invalid(format!(
                "pool.min_idle ({}) exceeds pool.max_idle ({})",
                pool.min_idle, pool.max_idle
            )));
        }

        let intervals = [
            ("pool.eviction_interval_ms", pool.eviction_interval_ms),
            (
                "credential_pool.eviction_interval_ms",
                self.credential_pool.eviction_interval_ms,
            ),
            (
                "shared_client.reap_interval_ms",
                self.shared_client.reap_interval_ms,
            ),
            ("shared_client.idle_timeout_ms", self.shared_client.idle_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }

        if self.status.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "status.queue_capacity must be >= 1".into(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Session options with connection settings filled in; naming is left to
    /// the caller.
    pub(crate) fn session_options(
        &self,
        instance_name: String,
        admin_group: String,
        credential: Option<Credential>,
    ) -> SessionOptions {
        SessionOptions {
            instance_name,
            admin_group,
            namesrv_addrs: self.namesrv_addrs.clone(),
            credential,
            timeout: self.timeout(),
            vip_channel: self.vip_channel,
            tls: self.tls,
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn min_evictable_idle(&self) -> Option<Duration> {
        (self.min_evictable_idle_ms > 0).then(|| Duration::from_millis(self.min_evictable_idle_ms))
    }
}

impl StatusConfig {
    /// Effective worker count.
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        cores * 2
    }

    pub fn join_timeout(&self) -> Option<Duration> {
        (self.join_timeout_ms > 0).then(|| Duration::from_millis(self.join_timeout_ms))
    }
}

impl SharedClientConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}
