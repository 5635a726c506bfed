//! Error types for QLE
//!
//! This module defines all error types used by the lineage catalog and its
//! front ends.

use thiserror::Error;

use crate::catalog::QueryId;

/// Coarse classification of an [`Error`], used by front ends to decide how a
/// failure is reported and whether retrying makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The user's statement failed inside the query engine.
    StatementExecution,
    /// A query identifier or artifact name does not exist.
    NotFound,
    /// The catalog metadata transaction failed; nothing was written.
    CatalogWrite,
    /// Creating, measuring or dropping an artifact in the engine failed.
    EngineSideEffect,
    /// Configuration, I/O and internal failures.
    Other,
}

/// The main error type for QLE
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lookup Errors ==========
    #[error("Not found: query {0} does not exist")]
    QueryNotFound(QueryId),

    #[error("Not found: artifact '{0}' does not exist")]
    ArtifactNotFound(String),

    // ========== Catalog Errors ==========
    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("Catalog error: corrupted row - {0}")]
    CorruptedRow(String),

    // ========== Engine Errors ==========
    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Engine error: {0}")]
    Engine(String),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Config(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an engine-side failure (artifact create/measure/drop)
    pub fn engine(err: impl std::fmt::Display) -> Self {
        Error::Engine(err.to_string())
    }

    /// Wrap a failure of the user's own statement
    pub fn statement(err: impl std::fmt::Display) -> Self {
        Error::Statement(err.to_string())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Statement(_) => ErrorKind::StatementExecution,
            Error::QueryNotFound(_) | Error::ArtifactNotFound(_) => ErrorKind::NotFound,
            Error::Catalog(_) | Error::CorruptedRow(_) => ErrorKind::CatalogWrite,
            Error::Engine(_) => ErrorKind::EngineSideEffect,
            Error::Config(_) | Error::IoError(_) | Error::Internal(_) => ErrorKind::Other,
        }
    }

    /// Check if this error reports a missing query or artifact
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Result type alias for QLE operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::QueryNotFound(42);
        assert_eq!(err.to_string(), "Not found: query 42 does not exist");

        let err = Error::ArtifactNotFound("qle_view_7".to_string());
        assert_eq!(
            err.to_string(),
            "Not found: artifact 'qle_view_7' does not exist"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::QueryNotFound(1).kind(), ErrorKind::NotFound);
        assert!(Error::ArtifactNotFound("x".into()).is_not_found());
        assert_eq!(
            Error::statement("no such table: actor").kind(),
            ErrorKind::StatementExecution
        );
        assert_eq!(
            Error::engine("disk full").kind(),
            ErrorKind::EngineSideEffect
        );
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::CatalogWrite
        );
    }
}
