use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;

use pgwatch3_metricstore_common::SchemaType;

use crate::pool::PgPool;

#[derive(QueryableByName)]
struct SchemaTypeRow {
    #[diesel(sql_type = Text)]
    schema_type: String,
}

/// Reads the one-column, one-row storage-type settings table.
/// Any error or missing row defaults to `Plain`; called once at writer
/// start, the result is sticky for the writer's lifetime.
pub(crate) async fn read_schema_type(pool: &PgPool) -> SchemaType {
    read_inner(pool).await.unwrap_or(SchemaType::Plain)
}

async fn read_inner(pool: &PgPool) -> Result<SchemaType, ()> {
    let mut conn = pool.conn().await.map_err(|_| ())?;
    let row: SchemaTypeRow = sql_query("SELECT schema_type FROM admin.storage_schema_type LIMIT 1")
        .get_result(&mut conn)
        .await
        .map_err(|_| ())?;
    Ok(SchemaType::from(row.schema_type.as_str()))
}
