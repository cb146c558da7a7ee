/// The metric store's storage layout, detected once at writer start and
/// sticky for the writer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaType {
    #[default]
    Plain,
    Timeseries,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Plain => "plain",
            SchemaType::Timeseries => "timescale",
        }
    }
}

impl From<&str> for SchemaType {
    fn from(value: &str) -> Self {
        match value {
            "timescale" | "timeseries" => SchemaType::Timeseries,
            _ => SchemaType::Plain,
        }
    }
}
