use std::fmt::Debug;

use async_trait::async_trait;

use crate::measurement::{MeasurementBatch, SyncOp};

/// The contract a sink (relational metric store, file sink, scrape endpoint)
/// implements and the multi-writer dispatcher dispatches against.
#[async_trait]
pub trait MetricWriter: Debug + Send + Sync {
    type Error;

    /// Registers (or, for `SyncOp::Remove`, no-ops on) a `(tenant, metric)`
    /// pair. `add` is idempotent.
    async fn sync_metric(
        &self,
        tenant: &str,
        metric: &str,
        op: SyncOp,
    ) -> Result<(), Self::Error>;

    /// Enqueues `batch` for eventual durable storage: may suspend up to
    /// five seconds, then silently drops on overload; returns immediately
    /// (Ok) if the writer was cancelled.
    async fn write(&self, batch: MeasurementBatch) -> Result<(), Self::Error>;
}
