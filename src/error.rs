use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoutError {
    /// A required column is absent or an unknown column was referenced.
    #[error("schema error: {0}")]
    Schema(String),

    /// Malformed criteria, rating or reducer/estimator configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Nulls where the operation needs complete data.
    #[error("data quality error: {0}")]
    DataQuality(String),

    /// Out-of-range dimension, cluster count, window or similar argument.
    #[error("value error: {0}")]
    Value(String),
}

impl ScoutError {
    pub(crate) fn unknown_column(name: &str) -> Self {
        Self::Schema(format!("unknown column '{name}'"))
    }
}
