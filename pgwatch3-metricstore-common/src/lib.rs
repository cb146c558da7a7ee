pub mod error;
pub mod measurement;
pub mod partitions;
pub mod schema_type;
pub mod traits;
pub mod value;

pub use error::{WriterError, WriterErrorIntrospect, WriterErrorKind};
pub use measurement::{split_row, Measurement, MeasurementBatch, Row, SplitRow, SyncOp};
pub use partitions::{PartitionBounds, PlainPartitionCache, TimeseriesPartitionCache};
pub use schema_type::SchemaType;
pub use traits::MetricWriter;
pub use value::MeasurementValue;

/// Fixed list of change-event metric names seeded with an empty top-level
/// table on writer start, so dashboards never render an empty-result error
/// for a metric that simply hasn't fired yet.
pub const DUMMY_SEED_METRICS: &[&str] = &[
    "sproc_changes",
    "table_changes",
    "index_changes",
    "privilege_changes",
    "object_changes",
    "configuration_changes",
];

/// Magic integer for the distinct-tenant maintainer's session advisory lock.
pub const DISTINCT_TENANT_LOCK_ID: i64 = 1571543679778230000;

/// Ingestion queue capacity.
pub const QUEUE_CAPACITY: usize = 512;

/// Batcher working-buffer capacity.
pub const BATCH_BUFFER_CAPACITY: usize = 512;
