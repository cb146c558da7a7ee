use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// The known-covered time range of a partition (or set of partitions) for a
/// metric, as last reported by the store's `ensure_partition_*` procedures
///. Advisory only: it may lag the physical catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PartitionBounds {
    pub fn covers(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Per-(metric, tenant) partition-bounds cache used in plain-partitioned
/// mode. Mutated only by the batcher task.
#[derive(Debug, Default)]
pub struct PlainPartitionCache {
    bounds: HashMap<String, HashMap<String, PartitionBounds>>,
}

impl PlainPartitionCache {
    pub fn get(&self, metric: &str, tenant: &str) -> Option<PartitionBounds> {
        self.bounds.get(metric)?.get(tenant).copied()
    }

    pub fn set(&mut self, metric: &str, tenant: &str, bounds: PartitionBounds) {
        self.bounds
            .entry(metric.to_owned())
            .or_default()
            .insert(tenant.to_owned(), bounds);
    }
}

/// Per-metric partition-bounds cache used in time-series-extension mode
///. Also used, metric-keyed only, for `_realtime` metrics managed
/// as plain partitions under that mode.
#[derive(Debug, Default)]
pub struct TimeseriesPartitionCache {
    bounds: HashMap<String, PartitionBounds>,
    /// Metrics for which `ensure_partition_timescale` has already run once.
    hypertables_ensured: std::collections::HashSet<String>,
}

impl TimeseriesPartitionCache {
    pub fn get(&self, metric: &str) -> Option<PartitionBounds> {
        self.bounds.get(metric).copied()
    }

    pub fn set(&mut self, metric: &str, bounds: PartitionBounds) {
        self.bounds.insert(metric.to_owned(), bounds);
    }

    pub fn is_hypertable_ensured(&self, metric: &str) -> bool {
        self.hypertables_ensured.contains(metric)
    }

    pub fn mark_hypertable_ensured(&mut self, metric: &str) {
        self.hypertables_ensured.insert(metric.to_owned());
    }
}
