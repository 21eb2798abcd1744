//! Error types for the feature computation job

use thiserror::Error;

/// Result type for feature computation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by pipeline stages
#[derive(Debug, Error)]
pub enum Error {
    /// Curated source produced zero usable rows
    #[error("curated store has no usable rows in the requested range")]
    EmptyInput,

    /// A feature column cannot support numeric modeling
    #[error("degenerate feature column '{column}': {reason}")]
    DegenerateFeature { column: String, reason: String },

    /// Invalid pipeline configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A feature record does not match the declared column set
    #[error("row shape mismatch at {ts}: expected {expected} feature values, got {actual}")]
    RowShape {
        ts: String,
        expected: usize,
        actual: usize,
    },

    /// Shared error (database, IO, config file)
    #[error(transparent)]
    Common(#[from] wfs_common::Error),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Common(wfs_common::Error::Database(e))
    }
}
