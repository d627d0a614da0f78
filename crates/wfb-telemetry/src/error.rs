use thiserror::Error;

/// Failure to decode a serialized statistics record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("stats record has {found} fields, expected {expected}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid value {value:?} for stats field `{field}`")]
    InvalidField { field: &'static str, value: String },
}
