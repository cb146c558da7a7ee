#[macro_use]
extern crate slog_scope;

mod metrics;

use std::fmt;

pub use metrics::{metrics_from_opts, MetricError, Metrics};

/// Implemented by crate-local error types so callers can report them without
/// knowing the concrete error enum.
pub trait ReportableError: fmt::Debug {
    fn error_backtrace(&self) -> String;
    fn is_sentry_event(&self) -> bool;
    fn metric_label(&self) -> Option<String>;
}

/// Implemented by error types that can represent an internal/unexpected
/// failure, so generic helpers (e.g. cancellation wrappers) can construct one
/// without knowing every variant of the concrete error enum.
pub trait InternalError {
    fn internal_error(message: String) -> Self;
}

#[macro_export]
macro_rules! from_error {
    ($from:ty, $to:ty, $to_kind:expr) => {
        impl From<$from> for $to {
            fn from(inner: $from) -> $to {
                $to_kind(inner).into()
            }
        }
    };
}

#[macro_export]
macro_rules! impl_fmt_display {
    ($error:ty, $kind:ty) => {
        impl std::fmt::Display for $error {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.kind, formatter)
            }
        }
    };
}
