//! Resource counters
//!
//! Every counting decision goes through a [`CounterGroup`], which fans it out
//! to the registered [`Counter`]s:
//! - [`BuildinCounter`]: per `(kind, tenant)` counts backing the built-in quota,
//!   optionally mirrored into the `cassava_quota_usage` gauge
//! - [`MetricsCounter`]: counts create and delete decisions as metrics

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::model::ResourceKind;

/// Consumer contract for counting decisions
pub trait Counter: Send + Sync {
    fn name(&self) -> &str;

    /// An entity of `kind` now exists under `tenant`
    fn on_create(&self, kind: ResourceKind, tenant: &str);

    /// An entity of `kind` was removed from `tenant`
    fn on_delete(&self, kind: ResourceKind, tenant: &str);
}

/// Ordered set of counters that all receive every decision
#[derive(Default)]
pub struct CounterGroup {
    counters: Vec<Arc<dyn Counter>>,
}

impl CounterGroup {
    pub fn new() -> Self {
        Self {
            counters: Vec::new(),
        }
    }

    /// Register a counter; counters are invoked in registration order
    pub fn register(&mut self, counter: Arc<dyn Counter>) {
        info!("Counter '{}' registered", counter.name());
        self.counters.push(counter);
    }

    pub fn list(&self) -> Vec<&str> {
        self.counters.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn on_create(&self, kind: ResourceKind, tenant: &str) {
        for counter in &self.counters {
            counter.on_create(kind, tenant);
        }
    }

    pub fn on_delete(&self, kind: ResourceKind, tenant: &str) {
        for counter in &self.counters {
            counter.on_delete(kind, tenant);
        }
    }
}

/// A single counter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterEntry {
    pub kind: ResourceKind,
    pub tenant: String,
    pub count: i64,
}

/// In-memory per `(kind, tenant)` counts, never below zero
///
/// Entries are created on first increment and kept for the process lifetime.
/// With the usage gauge enabled every effective change moves
/// `cassava_quota_usage{kind,tenant}` by the same delta, so the gauge ends at
/// the count whatever order concurrent updates publish in.
#[derive(Debug, Default)]
pub struct BuildinCounter {
    counts: DashMap<(ResourceKind, String), AtomicI64>,
    usage_gauge: bool,
}

pub const BUILDIN_COUNTER_NAME: &str = "buildin";

impl BuildinCounter {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
            usage_gauge: false,
        }
    }

    pub fn with_usage_gauge(mut self) -> Self {
        self.usage_gauge = true;
        self
    }

    /// Add one and return the new count
    pub fn increment(&self, kind: ResourceKind, tenant: &str) -> i64 {
        let count = self
            .counts
            .entry((kind, tenant.to_string()))
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        if self.usage_gauge {
            usage_gauge(kind, tenant).increment(1.0);
        }
        count
    }

    /// Remove one and return the new count, `None` when already at zero
    pub fn decrement(&self, kind: ResourceKind, tenant: &str) -> Option<i64> {
        let cell = self.counts.get(&(kind, tenant.to_string()))?;
        let prev = cell
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v > 0 { Some(v - 1) } else { None }
            })
            .ok()?;
        if self.usage_gauge {
            usage_gauge(kind, tenant).decrement(1.0);
        }
        Some(prev - 1)
    }

    /// Current count, 0 when never incremented
    pub fn get(&self, kind: ResourceKind, tenant: &str) -> i64 {
        self.counts
            .get(&(kind, tenant.to_string()))
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// All entries sorted by kind then tenant
    pub fn snapshot(&self) -> Vec<CounterEntry> {
        let mut entries: Vec<CounterEntry> = self
            .counts
            .iter()
            .map(|e| CounterEntry {
                kind: e.key().0,
                tenant: e.key().1.clone(),
                count: e.value().load(Ordering::SeqCst),
            })
            .collect();
        entries.sort_by(|a, b| (a.kind, &a.tenant).cmp(&(b.kind, &b.tenant)));
        entries
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Counter for BuildinCounter {
    fn name(&self) -> &str {
        BUILDIN_COUNTER_NAME
    }

    fn on_create(&self, kind: ResourceKind, tenant: &str) {
        let count = self.increment(kind, tenant);
        debug!(%kind, tenant, count, "Counter incremented");
    }

    fn on_delete(&self, kind: ResourceKind, tenant: &str) {
        match self.decrement(kind, tenant) {
            Some(count) => debug!(%kind, tenant, count, "Counter decremented"),
            None => debug!(%kind, tenant, "Counter already at 0, delete ignored"),
        }
    }
}

fn usage_gauge(kind: ResourceKind, tenant: &str) -> metrics::Gauge {
    metrics::gauge!(
        "cassava_quota_usage",
        "kind" => kind.as_str(),
        "tenant" => tenant.to_string()
    )
}

/// Counts decisions as `cassava_quota_events_total{kind,op}`
#[derive(Debug, Default)]
pub struct MetricsCounter;

pub const METRICS_COUNTER_NAME: &str = "metrics";

impl MetricsCounter {
    pub fn new() -> Self {
        Self
    }

    fn publish(&self, kind: ResourceKind, op: &'static str) {
        metrics::counter!(
            "cassava_quota_events_total",
            "kind" => kind.as_str(),
            "op" => op
        )
        .increment(1);
    }
}

impl Counter for MetricsCounter {
    fn name(&self) -> &str {
        METRICS_COUNTER_NAME
    }

    fn on_create(&self, kind: ResourceKind, tenant: &str) {
        trace!(%kind, tenant, "Create decision recorded");
        self.publish(kind, "create");
    }

    fn on_delete(&self, kind: ResourceKind, tenant: &str) {
        trace!(%kind, tenant, "Delete decision recorded");
        self.publish(kind, "delete");
    }
}
