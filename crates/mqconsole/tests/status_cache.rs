// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Consumer-group status cache integration tests

use mqconsole::client::{
    Connection, ConsumeStats, ConsumeType, ConsumerConnection, MessageModel,
    SubscriptionGroupConfig,
};
use mqconsole::memory::InMemoryCluster;
use mqconsole::{AdminConsole, ConsoleConfig, Error, GroupFilter, GroupKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BROKER_A: &str = "10.0.0.1:10911";
const BROKER_B: &str = "10.0.0.2:10911";

fn console(cluster: &InMemoryCluster) -> AdminConsole {
    let mut config = ConsoleConfig::default();
    config.status.worker_threads = 4;
    AdminConsole::new(config, Arc::new(cluster.clone())).expect("console")
}

// ============================================================================
// Build and ordering
// ============================================================================

#[test]
fn test_failing_group_omitted_rest_ordered() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("g1"))
        .add_group(BROKER_A, SubscriptionGroupConfig::new("g2"))
        .add_group(BROKER_B, SubscriptionGroupConfig::new("g3"))
        .set_subscribers("g1", 2)
        .set_backlog("g1", 10)
        .set_subscribers("g3", 2)
        .set_backlog("g3", 70)
        .set_subscribers("g2", 9)
        .fail_group("g2");
    let console = console(&cluster);

    assert_eq!(console.rebuild_snapshot().expect("rebuild"), 2);
    let snapshot = console.group_snapshot().expect("snapshot");
    assert_eq!(snapshot.group_names(), vec!["g3", "g1"]);
}

#[test]
fn test_many_groups_with_failures() {
    let cluster = InMemoryCluster::with_default_topology();
    for i in 0..40 {
        let name = format!("group-{:02}", i);
        let broker = if i % 2 == 0 { BROKER_A } else { BROKER_B };
        cluster
            .add_group(broker, SubscriptionGroupConfig::new(name.clone()))
            .set_subscribers(&name, i % 5)
            .set_backlog(&name, i as i64 * 3);
        if i % 7 == 0 {
            cluster.fail_group(&name);
        }
    }
    let console = console(&cluster);

    let snapshot = console.group_snapshot().expect("first read builds");
    assert_eq!(snapshot.len(), 40 - 6);

    let records = snapshot.records();
    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.subscribers > b.subscribers
                || (a.subscribers == b.subscribers && a.backlog >= b.backlog),
            "{} before {}",
            a.group,
            b.group
        );
    }
}

#[test]
fn test_record_fields() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("orders").orderly())
        .add_group(BROKER_B, SubscriptionGroupConfig::new("TOOLS_CONSUMER"))
        .add_group(BROKER_B, SubscriptionGroupConfig::new("offline"))
        .set_consume_stats(
            "orders",
            ConsumeStats {
                diff_total: 42,
                consume_tps: 12.5,
            },
        )
        .set_connection(
            "orders",
            ConsumerConnection {
                connections: vec![Connection {
                    client_id: "c1".into(),
                    client_addr: "192.168.0.9:50000".into(),
                    version: "V5_1_4".into(),
                }],
                consume_type: ConsumeType::Pull,
                message_model: MessageModel::Broadcasting,
            },
        );
    let console = console(&cluster);
    let snapshot = console.group_snapshot().expect("snapshot");

    let orders = snapshot.get("orders").expect("orders");
    assert_eq!(orders.kind, GroupKind::Fifo);
    assert_eq!(orders.subscribers, 1);
    assert_eq!(orders.backlog, 42);
    assert!((orders.consume_tps - 12.5).abs() < f64::EPSILON);
    assert_eq!(orders.consume_type, Some(ConsumeType::Pull));
    assert_eq!(orders.message_model, Some(MessageModel::Broadcasting));
    assert_eq!(orders.version.as_deref(), Some("V5_1_4"));
    assert!(orders.broker_addrs.contains(BROKER_A));

    assert_eq!(
        snapshot.get("TOOLS_CONSUMER").map(|r| r.kind),
        Some(GroupKind::System)
    );
    let offline = snapshot.get("offline").expect("offline kept");
    assert_eq!(offline.subscribers, 0);
    assert_eq!(offline.version, None);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_reads_during_rebuild_fail_fast() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("g1"))
        .add_group(BROKER_B, SubscriptionGroupConfig::new("g2"));
    let console = console(&cluster);
    console.rebuild_snapshot().expect("initial build");

    cluster.set_query_delay(Duration::from_millis(400));
    std::thread::scope(|scope| {
        let rebuild = scope.spawn(|| console.rebuild_snapshot());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !console.status_cache().is_building() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let start = Instant::now();
        let read = console.group_snapshot();
        assert!(matches!(read, Err(Error::BuildInProgress)));
        assert!(read.err().is_some_and(|e| e.is_retryable()));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(matches!(
            console.query_groups(&GroupFilter::all()),
            Err(Error::BuildInProgress)
        ));

        assert_eq!(rebuild.join().expect("join").expect("rebuild"), 2);
    });

    assert_eq!(console.group_snapshot().expect("snapshot").len(), 2);
}

#[test]
fn test_join_timeout_publishes_partial_result() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("g1"))
        .set_query_delay(Duration::from_millis(500));
    let mut config = ConsoleConfig::default();
    config.status.join_timeout_ms = 50;
    let console = AdminConsole::new(config, Arc::new(cluster.clone())).expect("console");

    assert_eq!(console.rebuild_snapshot().expect("rebuild"), 0);
    assert!(console.status_cache().last_built().is_some());
}

// ============================================================================
// Queries and single-group refresh
// ============================================================================

#[test]
fn test_query_groups_filters() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("Billing-EU"))
        .add_group(BROKER_A, SubscriptionGroupConfig::new("billing-us"))
        .add_group(BROKER_B, SubscriptionGroupConfig::new("shipping"))
        .add_group(BROKER_B, SubscriptionGroupConfig::new("SELF_TEST_C_GROUP"));
    let console = console(&cluster);

    assert_eq!(console.query_groups(&GroupFilter::all()).expect("all").len(), 4);
    assert_eq!(
        console
            .query_groups(&GroupFilter::default())
            .expect("user groups")
            .len(),
        3
    );
    let billing = console
        .query_groups(&GroupFilter::default().name_contains("BILLING"))
        .expect("billing");
    assert_eq!(billing.len(), 2);
}

#[test]
fn test_refresh_group_replaces_one_record() {
    let cluster = InMemoryCluster::with_default_topology();
    cluster
        .add_group(BROKER_A, SubscriptionGroupConfig::new("g1").orderly())
        .add_group(BROKER_B, SubscriptionGroupConfig::new("g2"))
        .set_subscribers("g1", 5)
        .set_subscribers("g2", 1);
    let console = console(&cluster);

    assert!(matches!(
        console.refresh_group("g1"),
        Err(Error::SnapshotUnavailable)
    ));
    console.rebuild_snapshot().expect("rebuild");
    let built = console.status_cache().last_built();

    cluster.set_backlog("g2", 1_000).set_subscribers("g2", 8);
    let record = console.refresh_group("g2").expect("refresh");
    assert_eq!(record.backlog, 1_000);

    let snapshot = console.group_snapshot().expect("snapshot");
    // Refresh replaces in place; order is only recomputed on rebuild.
    assert_eq!(snapshot.group_names(), vec!["g1", "g2"]);
    assert_eq!(snapshot.get("g2").map(|r| r.subscribers), Some(8));
    assert_eq!(console.status_cache().last_built(), built);

    // Config was not rediscovered, so classification comes from the lookup.
    assert_eq!(
        console.refresh_group("g1").expect("refresh").kind,
        GroupKind::Fifo
    );
    assert!(matches!(
        console.refresh_group("nope"),
        Err(Error::GroupNotFound(_))
    ));
}
