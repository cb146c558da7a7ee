use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use pgwatch3_metricstore_common::{MeasurementBatch, MetricWriter, SyncOp, WriterError};

use crate::error::CollectorError;

pub type BoxedWriter = Box<dyn MetricWriter<Error = WriterError> + Send + Sync>;

/// Fans a batch out to every configured sink concurrently.
/// `writers` is established at startup; the mutex guards only mutation of
/// the list — dispatch takes a cheap snapshot under the lock and releases
/// it before awaiting any sink.
#[derive(Default)]
pub struct MultiWriter {
    writers: Mutex<Vec<Arc<BoxedWriter>>>,
}

impl std::fmt::Debug for MultiWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiWriter").finish_non_exhaustive()
    }
}

impl MultiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, writer: BoxedWriter) {
        self.writers
            .lock()
            .expect("writers poisoned")
            .push(Arc::new(writer));
    }

    fn snapshot(&self) -> Vec<Arc<BoxedWriter>> {
        self.writers.lock().expect("writers poisoned").clone()
    }
}

#[async_trait]
impl MetricWriter for MultiWriter {
    type Error = CollectorError;

    async fn sync_metric(
        &self,
        tenant: &str,
        metric: &str,
        op: SyncOp,
    ) -> Result<(), Self::Error> {
        let writers = self.snapshot();
        let total = writers.len();
        let results = join_all(writers.iter().map(|w| w.sync_metric(tenant, metric, op))).await;
        collect_failures(total, results)
    }

    async fn write(&self, batch: MeasurementBatch) -> Result<(), Self::Error> {
        let writers = self.snapshot();
        let total = writers.len();
        let results = join_all(writers.iter().map(|w| w.write(batch.clone()))).await;
        collect_failures(total, results)
    }
}

fn collect_failures(
    total: usize,
    results: Vec<Result<(), WriterError>>,
) -> Result<(), CollectorError> {
    let failures: Vec<(usize, WriterError)> = results
        .into_iter()
        .enumerate()
        .filter_map(|(idx, r)| r.err().map(|e| (idx, e)))
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    for (idx, e) in &failures {
        warn!("sink dispatch failed"; "sink" => idx, "error" => e.to_string());
    }
    Err(CollectorError { total, failures })
}
