// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message-broker console core
//!
//! Administrative-session pooling, thread-scoped session binding and the
//! cached consumer-group status view behind a broker management console.
//!
//! # Features
//!
//! - **Global Pool**: bounded, health-checked sessions under the operator identity
//! - **Credential Pools**: one dedicated session per external identity
//! - **Thread Binding**: `run(|| ...)` makes the borrowed session reachable
//!   from any nested call through [`ThreadBinding::current_admin`]
//! - **Status Cache**: parallel per-group fan-out, atomically published snapshot
//! - **Shared Pull Client**: lazily started, reaped when idle
//!
//! # Configuration File
//!
//! ```toml
//! namesrv_addrs = ["10.0.0.1:9876"]
//!
//! [pool]
//! max_total = 64
//! max_wait_ms = 10000
//!
//! [status]
//! worker_threads = 8
//! join_timeout_ms = 30000
//!
//! [shared_client]
//! idle_timeout_ms = 60000
//! ```
//!
//! The wire protocol is not part of this crate: sessions come from a
//! [`ClientConnector`]. [`memory::InMemoryCluster`] is an in-process one.

pub mod background;
pub mod binding;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod memory;
pub mod pool;
pub mod shared;
pub mod status;

pub use binding::{BindingInterceptor, ThreadBinding};
pub use client::{
    AdminClient, ClientConnector, Credential, PullClient, RemoteError, RemotingClient,
    SharedAdmin, SharedPull,
};
pub use config::{ConfigError, ConsoleConfig};
pub use console::{AdminConsole, ConsoleStats};
pub use error::{Error, Result};
pub use pool::{CredentialPoolRegistry, GlobalClientPool, PoolStats};
pub use shared::{LazySharedClient, SharedClientLease};
pub use status::{GroupFilter, GroupKind, GroupStatusRecord, StatusCacheBuilder, StatusSnapshot};
