//! Relational (PostgreSQL-family) metric-store sink: connection pooling,
//! schema bootstrap, partition management, batched copy ingestion, and the
//! background retention / distinct-tenant maintenance loops.

#[macro_use]
extern crate slog_scope;

mod batcher;
mod bootstrap;
mod copy;
mod counters;
mod distinct_tenant;
mod error;
mod partitions;
mod pool;
mod queue;
mod reporter;
mod retention;
mod schema_probe;
mod seed;
mod util;
mod writer;

pub use bootstrap::ensure_config_store_schema;
pub use counters::Counters;
pub use pool::PgPool;
pub use writer::PgMetricWriter;
