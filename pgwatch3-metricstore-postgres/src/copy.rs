use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;

use pgwatch3_metricstore_common::{SplitRow, WriterError};

use crate::counters::Counters;
use crate::error;
use crate::pool::PgPool;
use crate::util::quote_ident;

/// One row ready for the copy stream: a resolved timestamp plus the
/// payload/tag split produced by splitting the raw measurement row.
#[derive(Debug, Clone)]
pub(crate) struct CopyRow {
    pub tenant: String,
    pub time: DateTime<Utc>,
    pub row: SplitRow,
}

/// Streams `rows` into `metric`'s top-level table via `COPY ... FROM STDIN
/// BINARY`. A JSON-encoding failure for the payload drops just
/// that row; a tag-encoding failure stores a null `tag_data` instead. A
/// copy-stream error (most commonly a missing partition) aborts the
/// remaining rows in this call and is returned for the caller to classify
/// and act on (`force_recreate`, counters, last-error channel).
pub(crate) async fn copy_metric(
    pool: &PgPool,
    metric: &str,
    rows: Vec<CopyRow>,
    counters: &Counters,
) -> Result<(), WriterError> {
    if rows.is_empty() {
        return Ok(());
    }

    let client = pool.copy_client().await?;
    let sql = format!(
        "COPY public.{} (time, dbname, data, tag_data) FROM STDIN BINARY",
        quote_ident(metric)
    );
    let sink = client.copy_in(sql.as_str()).await.map_err(error::classify_copy_error)?;
    let types = [Type::TIMESTAMPTZ, Type::TEXT, Type::JSON, Type::JSON];
    let writer = BinaryCopyInWriter::new(sink, &types);
    tokio::pin!(writer);

    for row in rows {
        let data: Json = match serde_json::to_value(&row.row.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping row, payload encoding failed"; "metric" => metric, "error" => e.to_string());
                counters.inc_dropped();
                continue;
            }
        };
        let tag_data: Option<Json> = if row.row.tags.is_empty() {
            None
        } else {
            match serde_json::to_value(&row.row.tags) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("tag encoding failed, storing null tags"; "metric" => metric, "error" => e.to_string());
                    counters.inc_write_failure();
                    None
                }
            }
        };

        writer
            .as_mut()
            .write(&[&row.time, &row.tenant, &data, &tag_data])
            .await
            .map_err(error::classify_copy_error)?;
    }

    writer.finish().await.map_err(error::classify_copy_error)?;
    Ok(())
}
