use std::collections::BTreeSet;
use std::time::Duration;

use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use tokio_util::sync::CancellationToken;

use pgwatch3_metricstore_common::{WriterError, DISTINCT_TENANT_LOCK_ID};

use crate::error;
use crate::pool::PgPool;
use crate::util::quote_ident;

const CYCLE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const BETWEEN_METRICS_DELAY: Duration = Duration::from_secs(60);

#[derive(QueryableByName)]
struct LockAcquired {
    #[diesel(sql_type = Bool)]
    #[diesel(column_name = pg_try_advisory_lock)]
    acquired: bool,
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    table_name: String,
}

#[derive(QueryableByName)]
struct DbName {
    #[diesel(sql_type = Text)]
    dbname: String,
}

/// Spawns the 24-hour distinct-tenant catalog maintainer. The
/// session-scoped advisory lock is the only cross-instance coordination in
/// the core: if another collector holds it, this cycle is skipped outright
/// rather than waiting.
pub(crate) fn spawn(pool: PgPool, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            run_cycle(&pool).await;
            if crate::util::sleep_or_cancelled(CYCLE_INTERVAL, &cancel).await {
                return;
            }
        }
    });
}

async fn run_cycle(pool: &PgPool) {
    match try_lock(pool).await {
        Ok(true) => {
            if let Err(e) = run_locked(pool).await {
                error!("distinct-tenant maintenance failed"; "error" => e.to_string());
            }
            if let Err(e) = unlock(pool).await {
                warn!("failed to release distinct-tenant advisory lock"; "error" => e.to_string());
            }
        }
        Ok(false) => {
            info!("distinct-tenant advisory lock held elsewhere, skipping cycle");
        }
        Err(e) => {
            error!("failed to acquire distinct-tenant advisory lock"; "error" => e.to_string());
        }
    }
}

async fn try_lock(pool: &PgPool) -> Result<bool, WriterError> {
    let mut conn = pool.conn().await?;
    let row: LockAcquired = sql_query("SELECT pg_try_advisory_lock($1) AS pg_try_advisory_lock")
        .bind::<BigInt, _>(DISTINCT_TENANT_LOCK_ID)
        .get_result(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(row.acquired)
}

/// Releases the session-scoped lock so it doesn't leak onto a connection
/// handed back to the pool, since the lock is taken on a pooled connection
/// rather than a dedicated one (see the design ledger).
async fn unlock(pool: &PgPool) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    sql_query("SELECT pg_advisory_unlock($1)")
        .bind::<BigInt, _>(DISTINCT_TENANT_LOCK_ID)
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(())
}

async fn run_locked(pool: &PgPool) -> Result<(), WriterError> {
    let tables = get_top_level_metric_tables(pool).await?;
    for metric in tables {
        let dbnames = distinct_dbnames(pool, &metric).await?;
        reconcile_metric(pool, &metric, &dbnames).await?;
        tokio::time::sleep(BETWEEN_METRICS_DELAY).await;
    }
    Ok(())
}

async fn get_top_level_metric_tables(pool: &PgPool) -> Result<Vec<String>, WriterError> {
    let mut conn = pool.conn().await?;
    let rows: Vec<TableName> =
        sql_query("SELECT table_name FROM admin.get_top_level_metric_tables() AS t(table_name)")
            .load(&mut conn)
            .await
            .map_err(error::internal)?;
    Ok(rows.into_iter().map(|r| r.table_name).collect())
}

/// Skip-scan distinct-value enumeration over `metric`'s table, expressed as
/// a recursive CTE: each step seeks the smallest `dbname` strictly greater
/// than the last one found, touching one index entry per distinct value
/// rather than scanning every row.
async fn distinct_dbnames(pool: &PgPool, metric: &str) -> Result<BTreeSet<String>, WriterError> {
    let mut conn = pool.conn().await?;
    let table = quote_ident(metric);
    let query = format!(
        r#"
        WITH RECURSIVE t AS (
            (SELECT dbname FROM public.{table} ORDER BY dbname LIMIT 1)
            UNION ALL
            SELECT (SELECT dbname FROM public.{table}
                    WHERE dbname > t.dbname ORDER BY dbname LIMIT 1)
            FROM t
            WHERE t.dbname IS NOT NULL
        )
        SELECT dbname FROM t WHERE dbname IS NOT NULL
        "#
    );
    let rows: Vec<DbName> = sql_query(query)
        .load(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(rows.into_iter().map(|r| r.dbname).collect())
}

async fn reconcile_metric(
    pool: &PgPool,
    metric: &str,
    dbnames: &BTreeSet<String>,
) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;

    if dbnames.is_empty() {
        let deleted = sql_query("DELETE FROM admin.all_distinct_dbname_metrics WHERE metric = $1")
            .bind::<Text, _>(metric)
            .execute(&mut conn)
            .await
            .map_err(error::internal)?;
        if deleted > 0 {
            info!("distinct-tenant catalog pruned, no remaining tenants"; "metric" => metric, "removed" => deleted);
        }
        return Ok(());
    }

    let known: Vec<DbName> =
        sql_query("SELECT dbname FROM admin.all_distinct_dbname_metrics WHERE metric = $1")
            .bind::<Text, _>(metric)
            .load(&mut conn)
            .await
            .map_err(error::internal)?;
    let known: BTreeSet<String> = known.into_iter().map(|r| r.dbname).collect();

    let stale: Vec<&String> = known.difference(dbnames).collect();
    let missing: Vec<&String> = dbnames.difference(&known).collect();

    let mut removed = 0usize;
    for dbname in &stale {
        removed += sql_query(
            "DELETE FROM admin.all_distinct_dbname_metrics WHERE metric = $1 AND dbname = $2",
        )
        .bind::<Text, _>(metric)
        .bind::<Text, _>(dbname.as_str())
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    }

    let added = missing.len();
    for dbname in &missing {
        sql_query(
            "INSERT INTO admin.all_distinct_dbname_metrics (dbname, metric) VALUES ($2, $1) ON CONFLICT DO NOTHING",
        )
        .bind::<Text, _>(metric)
        .bind::<Text, _>(dbname.as_str())
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    }

    if removed > 0 || added > 0 {
        info!("distinct-tenant catalog reconciled"; "metric" => metric, "removed" => removed, "added" => added);
    }
    Ok(())
}

/// Eagerly registers `(tenant, metric)`, called synchronously from
/// `SyncMetric("add", ...)` rather than waiting for the next maintainer
/// cycle.
pub(crate) async fn add_tenant_metric(
    pool: &PgPool,
    tenant: &str,
    metric: &str,
) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    sql_query(
        "INSERT INTO admin.all_distinct_dbname_metrics (dbname, metric) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind::<Text, _>(tenant)
    .bind::<Text, _>(metric)
    .execute(&mut conn)
    .await
    .map_err(error::internal)?;
    Ok(())
}
