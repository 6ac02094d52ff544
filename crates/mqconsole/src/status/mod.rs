// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-group status cache.
//!
//! - [`StatusCacheBuilder`]: discovery, fan-out, atomic publication
//! - [`StatusSnapshot`] / [`GroupStatusRecord`]: published data
//! - [`WorkerPool`] / [`CountDownLatch`]: bounded fan-out and join

pub mod builder;
pub mod record;
pub mod workers;

pub use builder::StatusCacheBuilder;
pub use record::{
    is_system_group, GroupFilter, GroupKind, GroupStatusRecord, StatusSnapshot, SYSTEM_GROUPS,
};
pub use workers::{CountDownLatch, LatchGuard, WorkerPool, WorkerStats};
