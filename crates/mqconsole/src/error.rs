// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the console core.

use std::time::Duration;
use thiserror::Error;

use crate::client::RemoteError;
use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by pool, binding, status-cache and shared-client operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// No client became available within the pool's max-wait.
    #[error("Timed out after {waited:?} waiting for a pooled client ({pool})")]
    Timeout { pool: String, waited: Duration },

    /// The pool was closed before or during the borrow.
    #[error("Pool closed: {0}")]
    PoolClosed(String),

    /// A client was given back to a pool that never handed it out.
    #[error("Client {0} is not currently borrowed from this pool")]
    ForeignObject(String),

    /// Health probe rejected a pooled client.
    #[error("Client {0} failed validation")]
    ValidationFailed(String),

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// No administrative client is bound to the calling thread.
    ///
    /// Raised when code that expects an intercepted operation runs outside
    /// one. Never retryable.
    #[error("No administrative client bound to thread {thread}")]
    BindingAbsent { thread: String },

    // ========================================================================
    // Status Cache Errors
    // ========================================================================
    /// A snapshot rebuild is running; try again shortly.
    #[error("Consumer group status is being rebuilt, try again shortly")]
    BuildInProgress,

    /// A single-group refresh was requested before any snapshot was built.
    #[error("Consumer group snapshot is empty; rebuild it first")]
    SnapshotUnavailable,

    /// The named group is not part of the current snapshot.
    #[error("Consumer group not found: {0}")]
    GroupNotFound(String),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A client session could not be started.
    #[error("Failed to start {what}: {source}")]
    StartFailure {
        what: String,
        #[source]
        source: RemoteError,
    },

    /// Transport failure reported by the administrative client.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::BuildInProgress => true,
            Error::Remote(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn binding_absent() -> Self {
        let current = std::thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };
        Error::BindingAbsent { thread }
    }
}
