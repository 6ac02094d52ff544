// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Thread binding and global pool integration tests

use mqconsole::memory::InMemoryCluster;
use mqconsole::{AdminConsole, ConsoleConfig, Error, ThreadBinding};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

fn console(cluster: &InMemoryCluster, max_total: usize) -> AdminConsole {
    let mut config = ConsoleConfig::default();
    config.pool.max_total = max_total;
    config.pool.max_idle = max_total;
    config.pool.max_wait_ms = 200;
    AdminConsole::new(config, Arc::new(cluster.clone())).expect("console")
}

/// Deeply nested call site that only knows about the thread binding.
fn broker_count() -> mqconsole::Result<usize> {
    let admin = ThreadBinding::current_admin()?;
    Ok(admin.cluster_info()?.broker_addr_table.len())
}

#[test]
fn test_nested_call_sees_bound_session() {
    let cluster = InMemoryCluster::with_default_topology();
    let console = console(&cluster, 4);

    assert!(matches!(broker_count(), Err(Error::BindingAbsent { .. })));
    assert_eq!(console.run(broker_count).expect("run"), 2);
    assert!(!ThreadBinding::is_bound());
}

#[test]
fn test_unbound_after_every_outcome() {
    let cluster = InMemoryCluster::with_default_topology();
    let console = console(&cluster, 4);

    let ok: mqconsole::Result<()> = console.run(|| Ok(()));
    assert!(ok.is_ok());
    assert!(!ThreadBinding::is_bound());

    let err: mqconsole::Result<()> = console.run(|| Err(Error::GroupNotFound("g".into())));
    assert!(err.is_err());
    assert!(!ThreadBinding::is_bound());

    let panicked = catch_unwind(AssertUnwindSafe(|| {
        let _: mqconsole::Result<()> = console.run(|| panic!("boom"));
    }));
    assert!(panicked.is_err());
    assert!(!ThreadBinding::is_bound());

    let stats = console.pool_stats().global;
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, 1);
}

#[test]
fn test_custom_error_type_through_run() {
    #[derive(Debug)]
    enum ApiError {
        Console(Error),
    }
    impl From<Error> for ApiError {
        fn from(e: Error) -> Self {
            ApiError::Console(e)
        }
    }

    let cluster = InMemoryCluster::with_default_topology();
    let console = console(&cluster, 1);
    let result: Result<String, ApiError> = console.run(|| {
        let admin = console.current_admin()?;
        Ok(admin.admin_group().to_string())
    });
    assert_eq!(result.expect("run"), "mqconsole_admin_group");

    let result: Result<(), ApiError> = console.run(|| Err(Error::SnapshotUnavailable.into()));
    assert!(matches!(result, Err(ApiError::Console(Error::SnapshotUnavailable))));
}

#[test]
fn test_threads_get_distinct_sessions() {
    let cluster = InMemoryCluster::with_default_topology();
    let console = console(&cluster, 4);
    let barrier = std::sync::Barrier::new(3);

    let names: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| {
                    console
                        .run(|| {
                            barrier.wait();
                            let name = console.current_admin()?.instance_name().to_string();
                            barrier.wait();
                            Ok::<_, Error>(name)
                        })
                        .expect("run")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    let mut distinct = names.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 3);
    assert_eq!(console.pool_stats().global.idle, 3);
}

#[test]
fn test_exhausted_pool_fails_without_running() {
    let cluster = InMemoryCluster::with_default_topology();
    let console = console(&cluster, 1);
    let console = &console;

    std::thread::scope(|scope| {
        let (tx, rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        scope.spawn(move || {
            console
                .run(|| {
                    tx.send(()).expect("signal");
                    release_rx.recv().expect("release");
                    Ok::<_, Error>(())
                })
                .expect("holder");
        });
        rx.recv().expect("holder bound");

        let mut ran = false;
        let result: mqconsole::Result<()> = console.run(|| {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(!ran);
        release_tx.send(()).expect("release");
    });

    assert_eq!(console.pool_stats().global.borrow_timeouts, 1);
}

#[test]
fn test_poisoned_session_replaced_after_sweep() {
    let cluster = InMemoryCluster::with_default_topology();
    let mut config = ConsoleConfig::default();
    config.pool.eviction_interval_ms = 30;
    let console = AdminConsole::new(config, Arc::new(cluster.clone())).expect("console");

    let first = console
        .run(|| Ok::<_, Error>(console.current_admin()?.instance_name().to_string()))
        .expect("run");
    cluster.poison(&first);
    std::thread::sleep(Duration::from_millis(300));

    let second = console
        .run(|| Ok::<_, Error>(console.current_admin()?.instance_name().to_string()))
        .expect("run");
    assert_ne!(first, second);
    assert!(cluster.is_shut_down(&first));
    assert_eq!(console.pool_stats().global.destroyed_by_validation, 1);
}
