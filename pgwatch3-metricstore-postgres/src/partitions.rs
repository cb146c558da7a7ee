use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use diesel::sql_query;
use diesel::sql_types::{Text, Timestamptz};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;

use pgwatch3_metricstore_common::{
    PartitionBounds, PlainPartitionCache, TimeseriesPartitionCache, WriterError,
};

use crate::error;
use crate::pool::PgPool;

#[derive(QueryableByName)]
struct BoundsRow {
    #[diesel(sql_type = Timestamptz)]
    start: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz, column_name = "end")]
    end_: DateTime<Utc>,
}

fn is_zero(ts: DateTime<Utc>) -> bool {
    ts.timestamp() == 0 && ts.timestamp_subsec_nanos() == 0
}

async fn call_ensure_partition_metric_dbname_time(
    pool: &PgPool,
    metric: &str,
    tenant: &str,
    ts: DateTime<Utc>,
) -> Result<PartitionBounds, WriterError> {
    let mut conn = pool.conn().await?;
    let row: BoundsRow = sql_query("SELECT * FROM admin.ensure_partition_metric_dbname_time($1, $2, $3)")
        .bind::<Text, _>(metric)
        .bind::<Text, _>(tenant)
        .bind::<Timestamptz, _>(ts)
        .get_result(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(PartitionBounds {
        start: row.start,
        end: row.end_,
    })
}

/// Calls `ensure_partition_metric_time` with a single timestamp and binds
/// only the returned `end` column; `start` is intentionally discarded.
async fn call_ensure_partition_metric_time(
    pool: &PgPool,
    metric: &str,
    ts: DateTime<Utc>,
) -> Result<DateTime<Utc>, WriterError> {
    let mut conn = pool.conn().await?;
    let row: BoundsRow = sql_query("SELECT * FROM admin.ensure_partition_metric_time($1, $2)")
        .bind::<Text, _>(metric)
        .bind::<Timestamptz, _>(ts)
        .get_result(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(row.end_)
}

async fn call_ensure_partition_timescale(pool: &PgPool, metric: &str) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    sql_query("SELECT admin.ensure_partition_timescale($1)")
        .bind::<Text, _>(metric)
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(())
}

/// Ensures plain-partitioned partitions cover `bounds`. Zero
/// `start`/`end` is a usage error that fails the whole flush.
pub(crate) async fn ensure_plain(
    pool: &PgPool,
    cache: &mut PlainPartitionCache,
    bounds: &BTreeMap<String, BTreeMap<String, PartitionBounds>>,
    force: bool,
) -> Result<(), WriterError> {
    for (metric, by_tenant) in bounds {
        for (tenant, incoming) in by_tenant {
            if is_zero(incoming.start) || is_zero(incoming.end) {
                return Err(WriterError::zero_timestamp());
            }

            let existing = cache.get(metric, tenant);
            let need_start = match existing {
                None => true,
                Some(e) => incoming.start < e.start || force,
            };
            if need_start {
                let updated =
                    call_ensure_partition_metric_dbname_time(pool, metric, tenant, incoming.start)
                        .await?;
                cache.set(metric, tenant, updated);
            }

            let existing = cache.get(metric, tenant);
            let need_end = match existing {
                None => true,
                Some(e) => incoming.end >= e.end || force,
            };
            if need_end {
                // Suspicious but specified: re-queries with
                // `start`, not `end`, even on this "end exceeded" branch.
                let updated =
                    call_ensure_partition_metric_dbname_time(pool, metric, tenant, incoming.start)
                        .await?;
                cache.set(metric, tenant, updated);
            }
        }
    }
    Ok(())
}

/// Ensures time-series-extension partitions cover `bounds`:
/// hypertables are ensured once per metric; `_realtime`-suffixed metrics
/// are instead managed as plain, metric-keyed (no tenant dimension)
/// partitions.
pub(crate) async fn ensure_timeseries(
    pool: &PgPool,
    cache: &mut TimeseriesPartitionCache,
    bounds: &BTreeMap<String, PartitionBounds>,
    realtime_metrics: &BTreeSet<String>,
    force: bool,
) -> Result<(), WriterError> {
    for (metric, incoming) in bounds {
        if realtime_metrics.contains(metric) {
            ensure_timeseries_realtime(pool, cache, metric, incoming, force).await?;
        } else if force || !cache.is_hypertable_ensured(metric) {
            call_ensure_partition_timescale(pool, metric).await?;
            cache.mark_hypertable_ensured(metric);
        }
    }
    Ok(())
}

async fn ensure_timeseries_realtime(
    pool: &PgPool,
    cache: &mut TimeseriesPartitionCache,
    metric: &str,
    incoming: &PartitionBounds,
    force: bool,
) -> Result<(), WriterError> {
    if is_zero(incoming.start) || is_zero(incoming.end) {
        return Err(WriterError::zero_timestamp());
    }

    let existing = cache.get(metric);
    let need_start = match existing {
        None => true,
        Some(e) => incoming.start < e.start || force,
    };
    if need_start {
        let end = call_ensure_partition_metric_time(pool, metric, incoming.start).await?;
        let start = existing.map(|e| e.start).unwrap_or(incoming.start);
        cache.set(metric, PartitionBounds { start, end });
    }

    let existing = cache.get(metric);
    let need_end = match existing {
        None => true,
        Some(e) => incoming.end >= e.end || force,
    };
    if need_end {
        let end = call_ensure_partition_metric_time(pool, metric, incoming.end).await?;
        let start = existing.map(|e| e.start).unwrap_or(incoming.start);
        cache.set(metric, PartitionBounds { start, end });
    }

    Ok(())
}
