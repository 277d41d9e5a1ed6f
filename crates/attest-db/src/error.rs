//! Error types for the attest-db crate.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A database query failed to execute.
    ///
    /// This can indicate SQL syntax errors, constraint violations,
    /// or issues with the query parameters.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// A stored value could not be decoded into its domain type.
    ///
    /// Indicates schema drift, e.g. an unknown purpose or status string.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}
