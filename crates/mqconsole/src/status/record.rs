// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Snapshot entries and their ordering.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use crate::client::{ConsumeType, MessageModel, SubscriptionGroupConfig};

/// Groups created by the broker itself.
pub const SYSTEM_GROUPS: &[&str] = &[
    "TOOLS_CONSUMER",
    "FILTERSRV_CONSUMER",
    "__MONITOR_CONSUMER",
    "CLIENT_INNER_PRODUCER",
    "SELF_TEST_P_GROUP",
    "SELF_TEST_C_GROUP",
    "CID_ONS-HTTP-PROXY",
    "CID_ONSAPI_PERMISSION",
    "CID_ONSAPI_OWNER",
    "CID_ONSAPI_PULL",
    "CID_SYS_RMQ_TRANS",
];

const SYSTEM_GROUP_PREFIX: &str = "CID_RMQ_SYS_";

/// Consumer group classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKind {
    System,
    Fifo,
    Normal,
}

impl GroupKind {
    /// System by name; otherwise FIFO when the subscription config asks for
    /// orderly consumption.
    pub fn classify(group: &str, config: Option<&SubscriptionGroupConfig>) -> Self {
        if is_system_group(group) {
            GroupKind::System
        } else if config.is_some_and(|c| c.consume_message_orderly) {
            GroupKind::Fifo
        } else {
            GroupKind::Normal
        }
    }
}

pub fn is_system_group(group: &str) -> bool {
    SYSTEM_GROUPS.contains(&group) || group.starts_with(SYSTEM_GROUP_PREFIX)
}

/// One consumer group as of the last rebuild or refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatusRecord {
    pub group: String,
    pub subscribers: usize,
    /// Messages produced but not yet consumed, across all queues.
    pub backlog: i64,
    pub kind: GroupKind,
    pub broker_addrs: BTreeSet<String>,
    pub consume_tps: f64,
    pub consume_type: Option<ConsumeType>,
    pub message_model: Option<MessageModel>,
    /// Client version of the first live connection.
    pub version: Option<String>,
    pub updated_at: SystemTime,
}

impl GroupStatusRecord {
    /// Snapshot order: subscribers desc, then backlog desc, then name.
    pub fn display_order(a: &Self, b: &Self) -> Ordering {
        b.subscribers
            .cmp(&a.subscribers)
            .then_with(|| b.backlog.cmp(&a.backlog))
            .then_with(|| a.group.cmp(&b.group))
    }
}

/// Published, immutable set of records.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    records: Vec<GroupStatusRecord>,
    built_at: Option<SystemTime>,
}

impl StatusSnapshot {
    pub(crate) fn new(mut records: Vec<GroupStatusRecord>, built_at: SystemTime) -> Self {
        records.sort_by(GroupStatusRecord::display_order);
        Self {
            records,
            built_at: Some(built_at),
        }
    }

    pub fn records(&self) -> &[GroupStatusRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `None` until the first rebuild publishes.
    pub fn built_at(&self) -> Option<SystemTime> {
        self.built_at
    }

    pub fn get(&self, group: &str) -> Option<&GroupStatusRecord> {
        self.records.iter().find(|r| r.group == group)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.group.as_str()).collect()
    }

    /// Copy with one record replaced in place; `None` if the group is absent.
    pub(crate) fn with_replaced(&self, record: GroupStatusRecord) -> Option<Self> {
        let index = self.records.iter().position(|r| r.group == record.group)?;
        let mut records = self.records.clone();
        records[index] = record;
        Some(Self {
            records,
            built_at: self.built_at,
        })
    }

    pub(crate) fn filtered(&self, filter: &GroupFilter) -> Vec<GroupStatusRecord> {
        self.records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }
}

/// Narrowing applied by `query_groups`.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub include_system: bool,
    /// Case-insensitive substring of the group name.
    pub name_contains: Option<String>,
}

impl GroupFilter {
    pub fn all() -> Self {
        Self {
            include_system: true,
            name_contains: None,
        }
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    pub fn matches(&self, record: &GroupStatusRecord) -> bool {
        if !self.include_system && record.kind == GroupKind::System {
            return false;
        }
        match &self.name_contains {
            Some(needle) if !needle.is_empty() => record
                .group
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

pub(crate) type SharedSnapshot = Arc<StatusSnapshot>;
