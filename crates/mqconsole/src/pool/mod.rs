// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Administrative-session pooling.
//!
//! - [`ObjectPool`]: generic bounded blocking pool with idle sweep
//! - [`AdminClientFactory`] / [`PooledClientFactory`]: session construction
//!   and the create/validate/destroy hooks
//! - [`GlobalClientPool`]: operator-identity sessions
//! - [`CredentialPoolRegistry`]: one capacity-1 pool per external identity

pub mod credential;
pub mod factory;
pub mod global;
pub mod object_pool;

pub use credential::CredentialPoolRegistry;
pub use factory::{AdminClientFactory, PooledClientFactory, SessionNaming, DEFAULT_ADMIN_GROUP};
pub use global::GlobalClientPool;
pub use object_pool::{ObjectPool, PoolSettings, PoolStats, PooledObjectFactory};
