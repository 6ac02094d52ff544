// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread-scoped client binding.
//!
//! An intercepted operation borrows one session from the global pool and
//! binds it to the calling thread for its duration:
//!
//! ```text
//! unbound --run()--> bound --closure returns / errors / panics--> unbound
//!                      |
//!                      +-- ThreadBinding::current_admin() anywhere below
//! ```
//!
//! Release happens in a drop guard, so the binding is cleared and the session
//! handed back on every exit path, unwinding included.
//!
//! A failed hand-back is logged and the session destroyed; it never replaces
//! the operation's own result.

use std::cell::RefCell;
use std::sync::Arc;

use crate::client::{AdminClient, RemotingClient, SharedAdmin};
use crate::error::{Error, Result};
use crate::pool::GlobalClientPool;

thread_local! {
    static BOUND: RefCell<Option<SharedAdmin>> = const { RefCell::new(None) };
}

/// Read access to the session bound to the calling thread.
pub struct ThreadBinding;

impl ThreadBinding {
    /// The session bound to this thread.
    ///
    /// # Errors
    ///
    /// [`Error::BindingAbsent`] when called outside an intercepted operation.
    pub fn current_admin() -> Result<SharedAdmin> {
        BOUND
            .with(|slot| slot.borrow().clone())
            .ok_or_else(Error::binding_absent)
    }

    /// Transport handle of the bound session, if it exposes one.
    pub fn current_remoting() -> Result<Option<Arc<dyn RemotingClient>>> {
        Ok(Self::current_admin()?.remoting())
    }

    pub fn is_bound() -> bool {
        BOUND.with(|slot| slot.borrow().is_some())
    }

    fn bind(client: SharedAdmin) {
        BOUND.with(|slot| {
            let previous = slot.borrow_mut().replace(client);
            debug_assert!(previous.is_none(), "thread already bound");
        });
    }

    fn unbind() -> Option<SharedAdmin> {
        BOUND.with(|slot| slot.borrow_mut().take())
    }
}

/// Clears the thread binding and hands the session back when dropped.
struct BoundSession<'a> {
    pool: &'a GlobalClientPool,
}

impl Drop for BoundSession<'_> {
    fn drop(&mut self) {
        let Some(client) = ThreadBinding::unbind() else {
            return;
        };
        let name = client.instance_name().to_string();
        if let Err(e) = self.pool.give_back(client) {
            log::warn!("[binding] failed to return {} to the pool: {}", name, e);
        }
    }
}

/// Wraps operations in borrow → bind → run → unbind → return.
#[derive(Clone)]
pub struct BindingInterceptor {
    pool: Arc<GlobalClientPool>,
}

impl BindingInterceptor {
    pub fn new(pool: Arc<GlobalClientPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<GlobalClientPool> {
        &self.pool
    }

    /// Run `f` with a global-pool session bound to this thread.
    ///
    /// If the thread is already bound (nested call), `f` runs on the existing
    /// binding and no second session is borrowed. If the borrow fails, `f`
    /// never runs.
    pub fn run<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce() -> std::result::Result<R, E>,
        E: From<Error>,
    {
        if ThreadBinding::is_bound() {
            return f();
        }

        let client = self.pool.borrow()?;
        ThreadBinding::bind(client);
        let _session = BoundSession { pool: &self.pool };
        f()
    }

    /// [`run`](Self::run) for closures that take the session explicitly.
    pub fn with_admin<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn AdminClient) -> Result<R>,
    {
        self.run(|| {
            let client = ThreadBinding::current_admin()?;
            f(client.as_ref())
        })
    }
}
