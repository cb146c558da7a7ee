use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use pgwatch3_common::Metrics;
use pgwatch3_metricstore_common::{
    split_row, MeasurementBatch, PartitionBounds, PlainPartitionCache, SchemaType, SplitRow,
    TimeseriesPartitionCache, WriterError, WriterErrorIntrospect, BATCH_BUFFER_CAPACITY,
};

use crate::copy::{self, CopyRow};
use crate::counters::Counters;
use crate::partitions;
use crate::pool::PgPool;
use crate::util::epoch_ns_to_datetime;

/// A single measurement after row splitting and timestamp resolution,
/// grouped for the partition-ensure and copy steps of one flush.
struct Resolved {
    tenant: String,
    metric: String,
    rows: Vec<(DateTime<Utc>, SplitRow)>,
}

fn merge_bounds(rows: &[(DateTime<Utc>, SplitRow)]) -> Option<PartitionBounds> {
    let mut iter = rows.iter().map(|(ts, _)| *ts);
    let first = iter.next()?;
    let (start, end) = iter.fold((first, first), |(s, e), ts| (s.min(ts), e.max(ts)));
    Some(PartitionBounds { start, end })
}

fn merge(a: PartitionBounds, b: PartitionBounds) -> PartitionBounds {
    PartitionBounds {
        start: a.start.min(b.start),
        end: a.end.max(b.end),
    }
}

/// Spawns the single batcher task that owns both partition caches and the
/// `force_recreate` flag for the writer's lifetime.
pub(crate) fn spawn(
    pool: PgPool,
    schema_type: SchemaType,
    rx: mpsc::Receiver<MeasurementBatch>,
    last_error_tx: mpsc::Sender<WriterError>,
    counters: Counters,
    metrics: Metrics,
    batching_delay_ms: u64,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut state = BatcherState {
            pool,
            schema_type,
            plain_cache: PlainPartitionCache::default(),
            ts_cache: TimeseriesPartitionCache::default(),
            force_recreate: false,
            epoch_warned: false,
            counters,
            metrics,
            last_error_tx,
        };
        state.run(rx, batching_delay_ms, cancel).await;
    });
}

struct BatcherState {
    pool: PgPool,
    schema_type: SchemaType,
    plain_cache: PlainPartitionCache,
    ts_cache: TimeseriesPartitionCache,
    force_recreate: bool,
    epoch_warned: bool,
    counters: Counters,
    metrics: Metrics,
    last_error_tx: mpsc::Sender<WriterError>,
}

impl BatcherState {
    /// Outer priority is context-done first (`biased`); only when
    /// cancellation isn't ready do the queue and ticker race normally.
    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<MeasurementBatch>,
        batching_delay_ms: u64,
        cancel: CancellationToken,
    ) {
        let mut buffer: Vec<MeasurementBatch> = Vec::with_capacity(BATCH_BUFFER_CAPACITY);
        let mut ticker = interval(Duration::from_millis(batching_delay_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                maybe_batch = rx.recv() => {
                    match maybe_batch {
                        Some(batch) => {
                            buffer.push(batch);
                            if buffer.len() >= BATCH_BUFFER_CAPACITY {
                                ticker.reset();
                                self.flush(&mut buffer).await;
                            }
                        }
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut buffer).await;
                }
            }
        }
    }

    async fn flush(&mut self, buffer: &mut Vec<MeasurementBatch>) {
        if buffer.is_empty() {
            return;
        }
        let started = Instant::now();
        let n_batches = buffer.len();
        let mut rows_total = 0usize;
        let mut resolved: Vec<Resolved> = Vec::new();

        for batch in buffer.drain(..) {
            for measurement in batch {
                if !measurement.is_valid() {
                    warn!("dropping invalid measurement"; "tenant" => measurement.tenant_id.as_str(), "metric" => measurement.metric_name.as_str());
                    continue;
                }
                let is_pooler = measurement.metric_name.starts_with("pgbouncer_");
                let custom_tags: Vec<(String, String)> = measurement
                    .custom_tags
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_tag_string()))
                    .collect();
                let mut rows = Vec::with_capacity(measurement.rows.len());
                for row in &measurement.rows {
                    rows_total += 1;
                    let mut split = split_row(row);
                    for (key, value) in &custom_tags {
                        split.tags.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                    if split.payload.is_empty() && split.tags.is_empty() {
                        continue;
                    }
                    let ts = match split.epoch_ns {
                        Some(ns) => epoch_ns_to_datetime(ns),
                        None => {
                            if !self.epoch_warned && !is_pooler {
                                warn!("row missing epoch_ns, using server time"; "metric" => measurement.metric_name.as_str());
                                self.epoch_warned = true;
                            }
                            Utc::now()
                        }
                    };
                    rows.push((ts, split));
                }
                resolved.push(Resolved {
                    tenant: measurement.tenant_id,
                    metric: measurement.metric_name,
                    rows,
                });
            }
        }

        if resolved.is_empty() {
            return;
        }

        let force = self.force_recreate;
        self.force_recreate = false;

        if let Err(e) = self.ensure_partitions(&resolved, force).await {
            error!("partition ensure failed, dropping flush"; "error" => e.to_string());
            if e.is_partition_missing() {
                self.force_recreate = true;
            }
            self.counters.inc_write_failure();
            let _ = self.last_error_tx.try_send(e);
            return;
        }

        let mut by_metric: BTreeMap<String, Vec<CopyRow>> = BTreeMap::new();
        for r in &resolved {
            let entry = by_metric.entry(r.metric.clone()).or_default();
            for (ts, split) in &r.rows {
                entry.push(CopyRow {
                    tenant: r.tenant.clone(),
                    time: *ts,
                    row: split.clone(),
                });
            }
        }

        for (metric, rows) in by_metric.iter() {
            if let Err(e) = copy::copy_metric(&self.pool, metric, rows.clone(), &self.counters).await {
                error!("copy failed"; "metric" => metric.as_str(), "error" => e.to_string());
                if e.is_partition_missing() {
                    self.force_recreate = true;
                }
                self.counters.inc_write_failure();
                let _ = self.last_error_tx.try_send(e);
            }
        }

        let elapsed_ms = started.elapsed().as_millis();
        self.metrics.count("writer.flush.rows_total", rows_total as i64);
        if resolved.len() == 1 {
            let only = &resolved[0];
            info!("flush complete"; "rows_batched" => n_batches, "rows_total" => rows_total,
                "elapsed_ms" => elapsed_ms, "tenant" => only.tenant.as_str(), "metric" => only.metric.as_str());
        } else {
            info!("flush complete"; "rows_batched" => n_batches, "rows_total" => rows_total,
                "elapsed_ms" => elapsed_ms, "n_metric_sets" => by_metric.len());
        }
    }

    async fn ensure_partitions(&mut self, resolved: &[Resolved], force: bool) -> Result<(), WriterError> {
        match self.schema_type {
            SchemaType::Plain => {
                let mut bounds: BTreeMap<String, BTreeMap<String, PartitionBounds>> = BTreeMap::new();
                for r in resolved {
                    let Some(b) = merge_bounds(&r.rows) else {
                        continue;
                    };
                    bounds
                        .entry(r.metric.clone())
                        .or_default()
                        .entry(r.tenant.clone())
                        .and_modify(|existing| *existing = merge(*existing, b))
                        .or_insert(b);
                }
                partitions::ensure_plain(&self.pool, &mut self.plain_cache, &bounds, force).await
            }
            SchemaType::Timeseries => {
                let mut bounds: BTreeMap<String, PartitionBounds> = BTreeMap::new();
                let mut realtime_metrics: BTreeSet<String> = BTreeSet::new();
                for r in resolved {
                    let Some(b) = merge_bounds(&r.rows) else {
                        continue;
                    };
                    if r.metric.ends_with("_realtime") {
                        realtime_metrics.insert(r.metric.clone());
                    }
                    bounds
                        .entry(r.metric.clone())
                        .and_modify(|existing| *existing = merge(*existing, b))
                        .or_insert(b);
                }
                partitions::ensure_timeseries(
                    &self.pool,
                    &mut self.ts_cache,
                    &bounds,
                    &realtime_metrics,
                    force,
                )
                .await
            }
        }
    }
}
