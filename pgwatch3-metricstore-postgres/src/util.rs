use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Double-quotes `name` as a Postgres identifier, escaping embedded quotes.
/// Used for the handful of places a table name has to be interpolated
/// rather than bound (`DROP TABLE`, `COPY ... FROM STDIN`) since neither
/// statement accepts a bind parameter for a relation name.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sleeps for `duration` unless `cancel` fires first; returns `true` if
/// cancelled, so background loops can check it and return immediately.
pub(crate) async fn sleep_or_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Converts a row's `epoch_ns` field (nanoseconds since the epoch) to a
/// `DateTime<Utc>`. Falls back to the current time for an
/// out-of-range value rather than panicking; in practice pollers only ever
/// send nanosecond timestamps near the present.
pub(crate) fn epoch_ns_to_datetime(epoch_ns: i64) -> DateTime<Utc> {
    let secs = epoch_ns.div_euclid(1_000_000_000);
    let nanos = epoch_ns.rem_euclid(1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}
