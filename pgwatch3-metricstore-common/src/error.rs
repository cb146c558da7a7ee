use backtrace::Backtrace;
use pgwatch3_common::{impl_fmt_display, InternalError, ReportableError};
use thiserror::Error;

#[derive(Debug)]
pub struct WriterError {
    kind: WriterErrorKind,
    pub backtrace: Box<Backtrace>,
}

#[derive(Debug, Error)]
pub enum WriterErrorKind {
    #[error("Invalid metric-store connection string: {}", _0)]
    InvalidUrl(String),

    #[error("Metric store unreachable: {}", _0)]
    Bootstrap(String),

    #[error("Schema bootstrap failed: {}", _0)]
    SchemaBootstrap(String),

    #[error("Partition for relation \"{}\" not found", _0)]
    PartitionMissing(String),

    #[error("Usage error: partition bounds start/end must be non-zero")]
    ZeroTimestamp,

    #[error("Row encoding failed: {}", _0)]
    Encoding(String),

    #[error("Unexpected error: {}", _0)]
    Internal(String),
}

impl WriterError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        WriterErrorKind::InvalidUrl(msg.into()).into()
    }

    pub fn bootstrap(msg: impl Into<String>) -> Self {
        WriterErrorKind::Bootstrap(msg.into()).into()
    }

    pub fn schema_bootstrap(msg: impl Into<String>) -> Self {
        WriterErrorKind::SchemaBootstrap(msg.into()).into()
    }

    pub fn partition_missing(relation: impl Into<String>) -> Self {
        WriterErrorKind::PartitionMissing(relation.into()).into()
    }

    pub fn zero_timestamp() -> Self {
        WriterErrorKind::ZeroTimestamp.into()
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        WriterErrorKind::Encoding(msg.into()).into()
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WriterErrorKind::Internal(msg.into()).into()
    }
}

/// Error-kind introspection: callers branch on *kind*, never on the
/// `Display` string, except for the
/// one sanctioned `no partition` substring match in the copy engine that
/// classifies a raw store error into [`WriterErrorKind::PartitionMissing`]
/// in the first place.
pub trait WriterErrorIntrospect {
    fn is_partition_missing(&self) -> bool;
    fn is_zero_timestamp(&self) -> bool;
}

impl WriterErrorIntrospect for WriterError {
    fn is_partition_missing(&self) -> bool {
        matches!(self.kind, WriterErrorKind::PartitionMissing(_))
    }

    fn is_zero_timestamp(&self) -> bool {
        matches!(self.kind, WriterErrorKind::ZeroTimestamp)
    }
}

impl ReportableError for WriterError {
    fn error_backtrace(&self) -> String {
        format!("{:?}", self.backtrace)
    }

    fn is_sentry_event(&self) -> bool {
        !matches!(self.kind, WriterErrorKind::PartitionMissing(_))
    }

    fn metric_label(&self) -> Option<String> {
        match &self.kind {
            WriterErrorKind::PartitionMissing(_) => Some("writer.partition_missing".to_owned()),
            WriterErrorKind::ZeroTimestamp => Some("writer.zero_timestamp".to_owned()),
            _ => None,
        }
    }
}

impl InternalError for WriterError {
    fn internal_error(message: String) -> Self {
        WriterError::internal(message)
    }
}

impl From<WriterErrorKind> for WriterError {
    fn from(kind: WriterErrorKind) -> Self {
        Self {
            kind,
            backtrace: Box::new(Backtrace::new()),
        }
    }
}

impl_fmt_display!(WriterError, WriterErrorKind);

impl std::error::Error for WriterError {}
