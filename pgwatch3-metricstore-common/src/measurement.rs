use std::collections::BTreeMap;

use crate::value::MeasurementValue;

/// Reserved row field carrying the measurement timestamp.
pub const EPOCH_NS_FIELD: &str = "epoch_ns";
/// Prefix whose suffix becomes a tag key.
pub const TAG_FIELD_PREFIX: &str = "tag_";

/// One row of a measurement, as handed to the writer by a poller. Keys are
/// whatever field names the metric's SQL produced; `epoch_ns` and `tag_*`
/// are interpreted specially by [`Row::split`].
pub type Row = BTreeMap<String, MeasurementValue>;

/// The result of separating a raw [`Row`] into its storage-relevant parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitRow {
    /// `Some` only when the row carried a non-zero `epoch_ns`.
    pub epoch_ns: Option<i64>,
    pub tags: BTreeMap<String, String>,
    pub payload: BTreeMap<String, MeasurementValue>,
}

/// Splits a raw row into payload/tag/timestamp parts :
/// - `epoch_ns` is pulled out as the timestamp (zero is treated as absent).
/// - `tag_*` fields become tags, keyed by the suffix, value stringified.
/// - null or empty-string fields are dropped entirely.
/// - everything else becomes a payload field.
pub fn split_row(row: &Row) -> SplitRow {
    let mut out = SplitRow::default();
    for (key, value) in row {
        if value.is_empty() {
            continue;
        }
        if key == EPOCH_NS_FIELD {
            if let MeasurementValue::Integer(ns) = value {
                if *ns != 0 {
                    out.epoch_ns = Some(*ns);
                }
            }
            continue;
        }
        if let Some(tag_key) = key.strip_prefix(TAG_FIELD_PREFIX) {
            out.tags.insert(tag_key.to_owned(), value.to_tag_string());
            continue;
        }
        out.payload.insert(key.clone(), value.clone());
    }
    out
}

/// A single measurement message: a batch of rows produced by one metric's
/// SQL for one tenant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub tenant_id: String,
    pub metric_name: String,
    pub custom_tags: BTreeMap<String, MeasurementValue>,
    pub rows: Vec<Row>,
}

impl Measurement {
    /// `true` if `tenant_id` contains a colon or is empty, or
    /// `metric_name` doesn't match `^[a-z0-9_.]+$`. Checked once, up front,
    /// by the batcher before any partition-ensure or copy work is attempted.
    pub fn is_valid(&self) -> bool {
        !self.tenant_id.is_empty()
            && !self.tenant_id.contains(':')
            && !self.metric_name.is_empty()
            && self
                .metric_name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.')
    }

    /// `true` for metrics whose name ends in `_realtime`.
    pub fn is_realtime(&self) -> bool {
        self.metric_name.ends_with("_realtime")
    }
}

/// A batch of measurements submitted in a single `write` call.
/// Most producers submit a single-message batch; the batcher's observability
/// line distinguishes the two shapes.
pub type MeasurementBatch = Vec<Measurement>;

/// `SyncMetric` operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Add,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, MeasurementValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn split_row_elides_null_and_empty_fields() {
        let r = row(&[
            ("numbackends", MeasurementValue::Integer(10)),
            ("dropped", MeasurementValue::Null),
            ("blank", MeasurementValue::Text(String::new())),
        ]);
        let split = split_row(&r);
        assert_eq!(split.payload.len(), 1);
        assert_eq!(
            split.payload.get("numbackends"),
            Some(&MeasurementValue::Integer(10))
        );
    }

    #[test]
    fn split_row_extracts_tags_and_epoch() {
        let r = row(&[
            ("epoch_ns", MeasurementValue::Integer(1_700_000_000_000_000_000)),
            ("tag_host", MeasurementValue::Text("h".into())),
            ("numbackends", MeasurementValue::Integer(10)),
        ]);
        let split = split_row(&r);
        assert_eq!(split.epoch_ns, Some(1_700_000_000_000_000_000));
        assert_eq!(split.tags.get("host"), Some(&"h".to_string()));
        assert_eq!(split.payload.len(), 1);
    }

    #[test]
    fn split_row_zero_epoch_is_absent() {
        let r = row(&[("epoch_ns", MeasurementValue::Integer(0))]);
        let split = split_row(&r);
        assert_eq!(split.epoch_ns, None);
    }

    #[test]
    fn split_row_only_tags_yields_empty_payload_not_no_row() {
        let r = row(&[("tag_host", MeasurementValue::Text("h".into()))]);
        let split = split_row(&r);
        assert!(split.payload.is_empty());
        assert_eq!(split.tags.len(), 1);
    }

    #[test]
    fn measurement_validity() {
        let mut m = Measurement {
            tenant_id: "db1".into(),
            metric_name: "db_stats".into(),
            ..Default::default()
        };
        assert!(m.is_valid());

        m.tenant_id = "db:1".into();
        assert!(!m.is_valid());

        m.tenant_id = "db1".into();
        m.metric_name = "DB_Stats".into();
        assert!(!m.is_valid());
    }

    #[test]
    fn realtime_metric_detection() {
        let m = Measurement {
            tenant_id: "db1".into(),
            metric_name: "wal_realtime".into(),
            ..Default::default()
        };
        assert!(m.is_realtime());
    }
}
