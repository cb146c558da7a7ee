use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `datastore_write_failures` and `total_metrics_dropped` :
/// mutated only from the batcher task but read from anywhere (a future
/// status endpoint, tests), so they're atomics rather than plain integers.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    write_failures: Arc<AtomicU64>,
    rows_dropped: Arc<AtomicU64>,
}

impl Counters {
    pub(crate) fn inc_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped(&self) {
        self.rows_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datastore_write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn total_metrics_dropped(&self) -> u64 {
        self.rows_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let c = Counters::default();
        assert_eq!(c.datastore_write_failures(), 0);
        c.inc_write_failure();
        c.inc_write_failure();
        c.inc_dropped();
        assert_eq!(c.datastore_write_failures(), 2);
        assert_eq!(c.total_metrics_dropped(), 1);
    }
}
