use std::time::Duration;

use diesel::sql_query;
use diesel::sql_types::{Integer, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use tokio_util::sync::CancellationToken;

use pgwatch3_metricstore_common::{SchemaType, WriterError};

use crate::error;
use crate::pool::PgPool;
use crate::util::{quote_ident, sleep_or_cancelled};

const STARTUP_DELAY: Duration = Duration::from_secs(60 * 60);
const CYCLE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
const SUCCESS_DELAY: Duration = Duration::from_secs(5);
const FAILURE_DELAY: Duration = Duration::from_secs(300);

#[derive(QueryableByName)]
struct DroppedCount {
    #[diesel(sql_type = Integer)]
    dropped: i32,
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    table_name: String,
}

/// Outcome of one plain-mode drop pass over the old-partition listing: lets
/// the caller tell "ran every table" apart from "cancelled partway through".
enum DropOutcome {
    Completed,
    Cancelled,
}

/// Spawns the retention worker. `retention_days <= 0` disables
/// it outright rather than looping on a permanent no-op. Sleeps an hour on
/// start to avoid noisy logs immediately after the writer comes up.
pub(crate) fn spawn(
    pool: PgPool,
    schema_type: SchemaType,
    retention_days: i32,
    cancel: CancellationToken,
) {
    if retention_days <= 0 {
        return;
    }
    tokio::spawn(async move {
        if sleep_or_cancelled(STARTUP_DELAY, &cancel).await {
            return;
        }
        loop {
            match schema_type {
                SchemaType::Timeseries => run_timeseries_cycle(&pool, retention_days).await,
                SchemaType::Plain => run_plain_cycle(&pool, retention_days, &cancel).await,
            }
            if sleep_or_cancelled(CYCLE_INTERVAL, &cancel).await {
                return;
            }
        }
    });
}

async fn run_timeseries_cycle(pool: &PgPool, retention_days: i32) {
    match drop_old_time_partitions(pool, retention_days).await {
        Ok(count) => info!("retention cycle complete"; "dropped" => count),
        Err(e) => error!("retention cycle failed"; "error" => e.to_string()),
    }
}

async fn drop_old_time_partitions(pool: &PgPool, retention_days: i32) -> Result<i32, WriterError> {
    let mut conn = pool.conn().await?;
    let row: DroppedCount = sql_query("SELECT admin.drop_old_time_partitions($1, false) AS dropped")
        .bind::<Integer, _>(retention_days)
        .get_result(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(row.dropped)
}

async fn run_plain_cycle(pool: &PgPool, retention_days: i32, cancel: &CancellationToken) {
    let tables = match get_old_time_partitions(pool, retention_days).await {
        Ok(tables) => tables,
        Err(e) => {
            error!("retention listing failed"; "error" => e.to_string());
            sleep_or_cancelled(FAILURE_DELAY, cancel).await;
            return;
        }
    };

    match drop_each(pool, &tables, cancel).await {
        DropOutcome::Completed => info!("retention cycle complete"; "dropped" => tables.len()),
        DropOutcome::Cancelled => {}
    }
}

async fn get_old_time_partitions(
    pool: &PgPool,
    retention_days: i32,
) -> Result<Vec<String>, WriterError> {
    let mut conn = pool.conn().await?;
    let rows: Vec<TableName> = sql_query(
        "SELECT table_name FROM admin.get_old_time_partitions($1) AS t(table_name)",
    )
    .bind::<Integer, _>(retention_days)
    .load(&mut conn)
    .await
    .map_err(error::internal)?;
    Ok(rows.into_iter().map(|r| r.table_name).collect())
}

async fn drop_each(pool: &PgPool, tables: &[String], cancel: &CancellationToken) -> DropOutcome {
    for table in tables {
        if cancel.is_cancelled() {
            return DropOutcome::Cancelled;
        }
        match drop_table(pool, table).await {
            Ok(()) => {
                if sleep_or_cancelled(SUCCESS_DELAY, cancel).await {
                    return DropOutcome::Cancelled;
                }
            }
            Err(e) => {
                error!("failed to drop old partition"; "table" => table.as_str(), "error" => e.to_string());
                if sleep_or_cancelled(FAILURE_DELAY, cancel).await {
                    return DropOutcome::Cancelled;
                }
            }
        }
    }
    DropOutcome::Completed
}

async fn drop_table(pool: &PgPool, table: &str) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    sql_query(format!("DROP TABLE IF EXISTS public.{}", quote_ident(table)))
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(())
}
