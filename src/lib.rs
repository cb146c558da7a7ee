#[macro_use]
extern crate slog_scope;

pub mod error;
pub mod logging;
pub mod multi_writer;

pub use error::CollectorError;
pub use multi_writer::{BoxedWriter, MultiWriter};
