//! Live-Postgres integration tests for the metric-store sink, exercising
//! the happy-path plain-mode flush and partition-missing recovery scenarios
//! end to end through the public `MetricWriter` contract.
//!
//! Gated on `TEST_DATABASE_URL`: skipped (not failed) when unset, a common
//! convention for environment-gated database tests. Unlike a
//! single-connection `begin_test_transaction` isolation strategy, this
//! sink owns a whole pool and runs background tasks against it for the
//! writer's lifetime, so isolation here is per-test schema objects (unique
//! table names) plus an explicit `DROP TABLE IF EXISTS` at the top of each
//! test rather than a rolled-back transaction.
//!
//! `admin.ensure_partition_metric_dbname_time` itself is one of the
//! externally-supplied catalog objects the core depends on (this sink's
//! own bootstrap only ensures the `admin` *schema*) — these tests install
//! a minimal stand-in that records its call count instead of physically
//! partitioning anything, which is enough to observe the ensure-before-copy
//! ordering without depending on a separate migration system.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;

use pgwatch3_common::Metrics;
use pgwatch3_metricstore_common::{Measurement, MeasurementValue, MetricWriter};
use pgwatch3_metricstore_postgres::PgMetricWriter;
use pgwatch3_settings::Settings;

fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

async fn connect(database_url: &str) -> tokio_postgres::Client {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .expect("connect to TEST_DATABASE_URL");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("test connection driver error: {e}");
        }
    });
    client
}

/// Installs the one external catalog object both scenarios depend on:
/// `admin.ensure_partition_metric_dbname_time`, plus a side table logging
/// each call so tests can assert on invocation count.
async fn install_ensure_partition_stub(client: &tokio_postgres::Client) {
    client
        .batch_execute("CREATE SCHEMA IF NOT EXISTS admin")
        .await
        .expect("create admin schema");
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS test_ensure_calls (
                metric text NOT NULL,
                dbname text NOT NULL,
                ts timestamptz NOT NULL
            )",
        )
        .await
        .expect("create call-log table");
    client
        .batch_execute(
            r#"
            CREATE OR REPLACE FUNCTION admin.ensure_partition_metric_dbname_time(
                metric text, dbname text, ts timestamptz
            ) RETURNS TABLE("start" timestamptz, "end" timestamptz) AS $$
            BEGIN
                INSERT INTO test_ensure_calls (metric, dbname, ts) VALUES ($1, $2, $3);
                RETURN QUERY SELECT ts - interval '1 day', ts + interval '1 day';
            END;
            $$ LANGUAGE plpgsql;
            "#,
        )
        .await
        .expect("install ensure_partition_metric_dbname_time stub");
}

async fn ensure_call_count(client: &tokio_postgres::Client, metric: &str, dbname: &str) -> i64 {
    client
        .query_one(
            "SELECT count(*) FROM test_ensure_calls WHERE metric = $1 AND dbname = $2",
            &[&metric, &dbname],
        )
        .await
        .expect("count ensure calls")
        .get(0)
}

fn row_with(epoch_ns: i64, pairs: &[(&str, MeasurementValue)]) -> BTreeMap<String, MeasurementValue> {
    let mut row = BTreeMap::new();
    row.insert("epoch_ns".to_string(), MeasurementValue::Integer(epoch_ns));
    for (k, v) in pairs {
        row.insert((*k).to_string(), v.clone());
    }
    row
}

async fn start_writer(database_url: &str) -> (PgMetricWriter, CancellationToken) {
    let settings = Settings {
        metric_store_database_urls: vec![database_url.to_string()],
        batching_delay_ms: 50,
        ..Settings::default()
    };
    let cancel = CancellationToken::new();
    let writer = PgMetricWriter::start(database_url, &settings, Metrics::noop(), cancel.clone())
        .await
        .expect("writer starts against test database");
    (writer, cancel)
}

#[tokio::test]
async fn happy_path_plain_mode_stores_row_and_ensures_partition_once() {
    let Some(database_url) = test_database_url() else {
        eprintln!("skipping happy_path_plain_mode: TEST_DATABASE_URL not set");
        return;
    };
    let metric = "itest_db_stats_happy";
    let tenant = "t1";

    let client = connect(&database_url).await;
    install_ensure_partition_stub(&client).await;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS public.{metric}"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "CREATE TABLE public.{metric} (time timestamptz NOT NULL, dbname text NOT NULL, data json NOT NULL, tag_data json)"
        ))
        .await
        .unwrap();
    client
        .execute(
            "DELETE FROM test_ensure_calls WHERE metric = $1 AND dbname = $2",
            &[&metric, &tenant],
        )
        .await
        .unwrap();

    let (writer, cancel) = start_writer(&database_url).await;

    let epoch_ns = 1_700_000_000_000_000_000i64; // 2023-11-14T22:13:20Z
    let row = row_with(
        epoch_ns,
        &[
            ("numbackends", MeasurementValue::Integer(10)),
            ("tag_host", MeasurementValue::Text("h".to_string())),
        ],
    );
    let measurement = Measurement {
        tenant_id: tenant.to_string(),
        metric_name: metric.to_string(),
        custom_tags: BTreeMap::new(),
        rows: vec![row],
    };

    writer.write(vec![measurement]).await.expect("write accepted");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let rows = client
        .query(
            &format!("SELECT time, dbname, data, tag_data FROM public.{metric}"),
            &[],
        )
        .await
        .expect("query stored rows");
    assert_eq!(rows.len(), 1, "exactly one row should be stored");
    let time: chrono::DateTime<chrono::Utc> = rows[0].get(0);
    assert_eq!(time.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    let dbname: String = rows[0].get(1);
    assert_eq!(dbname, tenant);
    let data: serde_json::Value = rows[0].get(2);
    assert_eq!(data["numbackends"], serde_json::json!(10));
    let tag_data: Option<serde_json::Value> = rows[0].get(3);
    assert_eq!(tag_data.unwrap()["host"], serde_json::json!("h"));

    let calls = ensure_call_count(&client, metric, tenant).await;
    assert_eq!(
        calls, 1,
        "ensure_partition_metric_dbname_time should be invoked exactly once"
    );
    assert_eq!(writer.counters().datastore_write_failures(), 0);

    cancel.cancel();
}

#[tokio::test]
async fn partition_missing_forces_recreate_on_next_flush() {
    let Some(database_url) = test_database_url() else {
        eprintln!("skipping partition_missing_recovery: TEST_DATABASE_URL not set");
        return;
    };
    let metric = "itest_wal_missing";
    let tenant = "t1";

    let client = connect(&database_url).await;
    install_ensure_partition_stub(&client).await;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS public.{metric}"))
        .await
        .unwrap();
    // A declarative range-partitioned parent with zero partitions attached:
    // any COPY into it raises Postgres's own "no partition of relation ...
    // found for row", the exact substring `classify_copy_error` matches on.
    client
        .batch_execute(&format!(
            "CREATE TABLE public.{metric} (time timestamptz NOT NULL, dbname text NOT NULL, data json NOT NULL, tag_data json) PARTITION BY RANGE (time)"
        ))
        .await
        .unwrap();
    client
        .execute(
            "DELETE FROM test_ensure_calls WHERE metric = $1 AND dbname = $2",
            &[&metric, &tenant],
        )
        .await
        .unwrap();

    let (writer, cancel) = start_writer(&database_url).await;

    let measurement = |epoch_ns: i64| Measurement {
        tenant_id: tenant.to_string(),
        metric_name: metric.to_string(),
        custom_tags: BTreeMap::new(),
        rows: vec![row_with(epoch_ns, &[("numbackends", MeasurementValue::Integer(1))])],
    };

    // First flush: ensure succeeds (it's only a bookkeeping stub), the
    // subsequent copy fails with "no partition" and sets force_recreate.
    writer
        .write(vec![measurement(1_700_000_000_000_000_000)])
        .await
        .expect("enqueue does not itself fail");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let calls_after_first = ensure_call_count(&client, metric, tenant).await;
    assert_eq!(calls_after_first, 1);

    // Second flush: force_recreate carried over from the failed copy makes
    // the partition manager re-call ensure for every cached metric
    // regardless of cache state — both the "start" and the
    // documented "end exceeded, re-queried with start" branches fire.
    let second_write = writer
        .write(vec![measurement(1_700_000_100_000_000_000)])
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let calls_after_second = ensure_call_count(&client, metric, tenant).await;
    assert_eq!(
        calls_after_second, 3,
        "force_recreate should re-ensure on both the start and end branches"
    );

    let rows = client
        .query(&format!("SELECT 1 FROM public.{metric}"), &[])
        .await
        .expect("query stored rows");
    assert!(rows.is_empty(), "no row can ever land in an unpartitioned parent");

    assert!(writer.counters().datastore_write_failures() >= 1);
    // The copy failure is surfaced at most once per write() call via the
    // lossy last-error channel; either this call or a following one will
    // observe it, so we don't assert on `second_write` directly here beyond
    // it not panicking.
    let _ = second_write;

    cancel.cancel();
}
