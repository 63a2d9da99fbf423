//! Error types for tagsql

use thiserror::Error;

/// Result type alias for tagsql operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for statement building and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Driver error, surfaced with the driver's own message
    #[error(transparent)]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid input (e.g. a pagination request naming a non-identifier)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The statement builder was driven in an order it cannot render
    /// (join before select, empty bulk insert, ...)
    #[error("Builder misuse: {0}")]
    Misuse(String),

    /// `exec_with_returned_id` was handed a statement without `RETURNING id`
    #[error("query has no RETURNING id clause")]
    MissingReturningClause,

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Deadline expired before the operation finished
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a builder misuse error
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a builder misuse error
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse(_))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
