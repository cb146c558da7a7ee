use pgwatch3_common::{InternalError, ReportableError};
use pgwatch3_metricstore_common::WriterError;

/// Aggregated failure from a single `MultiWriter` dispatch: which sinks (by
/// index into the registration order) failed and why. One failing sink
/// never prevents dispatch to the others; this type is how that partial
/// failure is reported back to the caller.
#[derive(Debug)]
pub struct CollectorError {
    pub total: usize,
    pub failures: Vec<(usize, WriterError)>,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {} sinks failed", self.failures.len(), self.total)?;
        for (idx, e) in &self.failures {
            write!(f, "; sink[{idx}]: {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CollectorError {}

impl ReportableError for CollectorError {
    fn error_backtrace(&self) -> String {
        self.failures
            .iter()
            .map(|(_, e)| e.error_backtrace())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    fn is_sentry_event(&self) -> bool {
        self.failures.iter().any(|(_, e)| e.is_sentry_event())
    }

    fn metric_label(&self) -> Option<String> {
        Some("dispatcher.sink_failures".to_owned())
    }
}

impl InternalError for CollectorError {
    fn internal_error(message: String) -> Self {
        CollectorError {
            total: 1,
            failures: vec![(0, WriterError::internal(message))],
        }
    }
}
