use serde::Serialize;

/// A single measurement field value, carried as a sum type rather than a raw
/// `serde_json::Value` so callers can distinguish "this came in as text" from
/// "this came in as a number" without re-parsing. Downstream storage
/// serializes every variant to JSON regardless, so callers don't need to
/// distinguish integer from float precisely.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl MeasurementValue {
    /// A value counts as "empty" for the purposes of the row-elision rule:
    /// null values and empty strings are dropped from the row.
    pub fn is_empty(&self) -> bool {
        matches!(self, MeasurementValue::Null)
            || matches!(self, MeasurementValue::Text(s) if s.is_empty())
    }

    /// Stringifies the value the way a tag suffix value is stringified.
    pub fn to_tag_string(&self) -> String {
        match self {
            MeasurementValue::Integer(i) => i.to_string(),
            MeasurementValue::Float(f) => f.to_string(),
            MeasurementValue::Bool(b) => b.to_string(),
            MeasurementValue::Text(s) => s.clone(),
            MeasurementValue::Null => String::new(),
        }
    }
}

impl From<i64> for MeasurementValue {
    fn from(v: i64) -> Self {
        MeasurementValue::Integer(v)
    }
}

impl From<f64> for MeasurementValue {
    fn from(v: f64) -> Self {
        MeasurementValue::Float(v)
    }
}

impl From<bool> for MeasurementValue {
    fn from(v: bool) -> Self {
        MeasurementValue::Bool(v)
    }
}

impl From<String> for MeasurementValue {
    fn from(v: String) -> Self {
        MeasurementValue::Text(v)
    }
}

impl From<&str> for MeasurementValue {
    fn from(v: &str) -> Self {
        MeasurementValue::Text(v.to_owned())
    }
}
