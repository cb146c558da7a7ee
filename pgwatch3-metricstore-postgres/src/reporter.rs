use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pgwatch3_common::Metrics;
use pgwatch3_db_common::GetPoolState;

use crate::pool::PgPool;
use crate::util::sleep_or_cancelled;

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns the periodic pool-state reporter, matching the
/// teacher's `spawn_metric_periodic_reporter`: samples the pool's occupancy
/// every 60 s and emits connection-count gauges tagged with hostname until
/// the writer is cancelled.
pub(crate) fn spawn(pool: PgPool, metrics: Metrics, cancel: CancellationToken) {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned());

    tokio::spawn(async move {
        let mut tags = HashMap::new();
        tags.insert("host".to_owned(), host);

        loop {
            if sleep_or_cancelled(REPORT_INTERVAL, &cancel).await {
                return;
            }
            let state = pool.state();
            let active = state.connections.saturating_sub(state.idle_connections);
            metrics.gauge_with_tags("storage.pool.connections.active", active as u64, tags.clone());
            metrics.gauge_with_tags(
                "storage.pool.connections.idle",
                state.idle_connections as u64,
                tags.clone(),
            );
        }
    });
}
