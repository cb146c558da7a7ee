use diesel::sql_query;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;

use pgwatch3_metricstore_common::WriterError;

use crate::error;
use crate::pool::PgPool;

/// Ensures a top-level metric table exists: called once per
/// seed metric on writer start, and again for arbitrary metrics on
/// `SyncMetric("add", ...)`.
pub(crate) async fn ensure_dummy_metrics_table(
    pool: &PgPool,
    metric: &str,
) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    sql_query("SELECT admin.ensure_dummy_metrics_table($1)")
        .bind::<Text, _>(metric)
        .execute(&mut conn)
        .await
        .map_err(error::internal)?;
    Ok(())
}

/// Seeds the fixed list of change-event metrics so dashboards never render
/// an empty-result error for a metric that simply hasn't fired yet
///. A failure here is logged, not fatal — writer startup
/// proceeds regardless.
pub(crate) async fn seed_dummy_tables(pool: &PgPool, metrics: &[&str]) {
    for metric in metrics {
        if let Err(e) = ensure_dummy_metrics_table(pool, metric).await {
            warn!("failed to seed dummy metrics table"; "metric" => *metric, "error" => e.to_string());
        }
    }
}
