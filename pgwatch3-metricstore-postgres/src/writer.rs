use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use pgwatch3_common::Metrics;
use pgwatch3_metricstore_common::{
    MeasurementBatch, MetricWriter, SyncOp, WriterError, DUMMY_SEED_METRICS, QUEUE_CAPACITY,
};
use pgwatch3_settings::Settings;

use crate::counters::Counters;
use crate::pool::PgPool;
use crate::{batcher, bootstrap, distinct_tenant, queue, reporter, retention, schema_probe, seed};

/// The relational metric-store sink : owns a connection pool,
/// the bounded ingestion queue, and the four background tasks (batcher,
/// retention, distinct-tenant maintainer, pool-state reporter) spawned once
/// in [`PgMetricWriter::start`] and running for the writer's lifetime.
#[derive(Clone)]
pub struct PgMetricWriter {
    pool: PgPool,
    tx: mpsc::Sender<MeasurementBatch>,
    last_error_rx: Arc<Mutex<mpsc::Receiver<WriterError>>>,
    cancel: CancellationToken,
    counters: Counters,
}

impl PgMetricWriter {
    /// Opens the pool, bootstraps the `admin` schema, detects the storage
    /// schema type, seeds the dummy change-event tables, and spawns every
    /// background task before returning. A failure before the writer exists
    /// is bootstrap-fatal and is returned to the caller rather than
    /// retried here.
    pub async fn start(
        database_url: &str,
        settings: &Settings,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Result<Self, WriterError> {
        let pool = PgPool::open(database_url, settings, &metrics).await?;
        bootstrap::ensure_metric_schema(&pool).await?;

        let schema_type = schema_probe::read_schema_type(&pool).await;
        info!("metric-store schema type detected"; "schema_type" => schema_type.as_str());

        seed::seed_dummy_tables(&pool, DUMMY_SEED_METRICS).await;

        let counters = Counters::default();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (last_error_tx, last_error_rx) = mpsc::channel(1);

        batcher::spawn(
            pool.clone(),
            schema_type,
            rx,
            last_error_tx,
            counters.clone(),
            metrics.clone(),
            settings.batching_delay_ms,
            cancel.clone(),
        );
        retention::spawn(pool.clone(), schema_type, settings.retention_days, cancel.clone());
        distinct_tenant::spawn(pool.clone(), cancel.clone());
        reporter::spawn(pool.clone(), metrics, cancel.clone());

        Ok(Self {
            pool,
            tx,
            last_error_rx: Arc::new(Mutex::new(last_error_rx)),
            cancel,
            counters,
        })
    }

    /// Read-only access to the write-failure / dropped-row counters for
    /// callers that want to expose them (a status endpoint, tests).
    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

#[async_trait]
impl MetricWriter for PgMetricWriter {
    type Error = WriterError;

    async fn sync_metric(&self, tenant: &str, metric: &str, op: SyncOp) -> Result<(), WriterError> {
        match op {
            SyncOp::Remove => Ok(()),
            SyncOp::Add => {
                seed::ensure_dummy_metrics_table(&self.pool, metric).await?;
                distinct_tenant::add_tenant_metric(&self.pool, tenant, metric).await
            }
        }
    }

    async fn write(&self, batch: MeasurementBatch) -> Result<(), WriterError> {
        queue::write(&self.tx, &self.last_error_rx, &self.cancel, batch).await
    }
}

impl std::fmt::Debug for PgMetricWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMetricWriter").finish_non_exhaustive()
    }
}
