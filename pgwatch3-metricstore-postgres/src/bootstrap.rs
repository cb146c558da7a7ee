use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;

use pgwatch3_common::Metrics;
use pgwatch3_metricstore_common::WriterError;
use pgwatch3_settings::Settings;

use crate::error;
use crate::pool::PgPool;

const METRIC_SCHEMA: &str = "admin";
const CONFIG_SCHEMA: &str = "pgwatch3";

/// Ordered, idempotent-only-once DDL applied the first time a metric-store
/// pool is bootstrapped. Every statement runs on its own
/// `sql_query`; the first failure aborts the remaining statements.
const METRIC_SCRIPTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS admin",
    r#"CREATE TABLE IF NOT EXISTS admin.storage_schema_type (
        schema_type text NOT NULL DEFAULT 'plain'
    )"#,
    "INSERT INTO admin.storage_schema_type (schema_type) SELECT 'plain' WHERE NOT EXISTS (SELECT 1 FROM admin.storage_schema_type)",
    r#"CREATE TABLE IF NOT EXISTS admin.all_distinct_dbname_metrics (
        dbname text NOT NULL,
        metric text NOT NULL,
        PRIMARY KEY (dbname, metric)
    )"#,
];

/// Ordered DDL for the external configuration store's own schema. Applied
/// only when a `config_store_database_url` is configured.
const CONFIG_SCRIPTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS pgwatch3",
    r#"CREATE TABLE IF NOT EXISTS pgwatch3.schema_version (
        version integer NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS pgwatch3.monitored_db (
        md_unique_name text PRIMARY KEY,
        md_hostname text NOT NULL,
        md_port text NOT NULL,
        md_dbname text NOT NULL,
        md_preset_config_name text,
        md_config jsonb
    )"#,
    r#"CREATE TABLE IF NOT EXISTS pgwatch3.metric (
        m_id serial PRIMARY KEY,
        m_name text NOT NULL,
        m_pg_version_from numeric NOT NULL DEFAULT 0,
        m_standby_only boolean NOT NULL DEFAULT false,
        m_sql text NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS pgwatch3.preset_config (
        pc_name text PRIMARY KEY,
        pc_config jsonb NOT NULL
    )"#,
];

#[derive(QueryableByName)]
struct SchemaName {
    #[diesel(sql_type = Text)]
    #[diesel(column_name = schema_name)]
    #[allow(dead_code)]
    schema_name: String,
}

async fn schema_exists(pool: &PgPool, schema: &str) -> Result<bool, WriterError> {
    let mut conn = pool.conn().await?;
    let rows: Vec<SchemaName> = sql_query(
        "SELECT schema_name FROM information_schema.schemata WHERE schema_name = $1",
    )
    .bind::<Text, _>(schema)
    .load(&mut conn)
    .await
    .map_err(error::internal)?;
    Ok(!rows.is_empty())
}

async fn apply_scripts(pool: &PgPool, scripts: &[&str]) -> Result<(), WriterError> {
    let mut conn = pool.conn().await?;
    for script in scripts {
        sql_query(*script)
            .execute(&mut conn)
            .await
            .map_err(|e| WriterError::schema_bootstrap(format!("{e}: {script}")))?;
    }
    Ok(())
}

/// Ensures the `admin` schema (and the catalog objects the core depends on)
/// exists on the metric-store pool, applying `METRIC_SCRIPTS` once.
pub(crate) async fn ensure_metric_schema(pool: &PgPool) -> Result<(), WriterError> {
    if schema_exists(pool, METRIC_SCHEMA).await? {
        return Ok(());
    }
    info!("metric schema absent, bootstrapping"; "schema" => METRIC_SCHEMA);
    apply_scripts(pool, METRIC_SCRIPTS).await
}

/// Ensures the `pgwatch3` configuration schema exists on the given pool.
async fn ensure_config_schema(pool: &PgPool) -> Result<(), WriterError> {
    if schema_exists(pool, CONFIG_SCHEMA).await? {
        return Ok(());
    }
    info!("config schema absent, bootstrapping"; "schema" => CONFIG_SCHEMA);
    apply_scripts(pool, CONFIG_SCRIPTS).await
}

/// Opens a bounded pool to the configuration store and ensures its
/// `pgwatch3` schema exists. Everything else about the
/// config store — listing monitored databases, reading preset bundles — is
/// an external collaborator outside this core; this is the one bootstrap
/// touchpoint the core owns.
pub async fn ensure_config_store_schema(
    database_url: &str,
    settings: &Settings,
    metrics: &Metrics,
) -> Result<(), WriterError> {
    let pool = PgPool::open(database_url, settings, metrics).await?;
    ensure_config_schema(&pool).await
}
