use pgwatch3_metricstore_common::WriterError;

/// Wraps any raw store error (diesel, deadpool, tokio-postgres) as a
/// generic, non-retriable `WriterError`.
pub(crate) fn internal(e: impl std::fmt::Display) -> WriterError {
    WriterError::internal(e.to_string())
}

/// Classifies a raw copy-stream error : the sole sanctioned
/// substring check in the whole taxonomy. Everything that isn't a
/// `no partition` failure is a generic write failure.
pub(crate) fn classify_copy_error(e: impl std::fmt::Display) -> WriterError {
    let message = e.to_string();
    if message.contains("no partition") {
        WriterError::partition_missing(message)
    } else {
        WriterError::internal(message)
    }
}
