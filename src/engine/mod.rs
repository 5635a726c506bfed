//! Query engine module
//!
//! The catalog never parses or plans SQL itself. It hands statement text to a
//! [`QueryEngine`] and observes the outcome, and asks the engine to create,
//! measure, read and drop materialized artifacts by name.

pub mod sqlite;
pub mod value;

pub use sqlite::SqliteEngine;
pub use value::{Row, Value};

use serde::Serialize;

use crate::error::Result;

/// Rows and column names produced by a statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Create a result set
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Successful outcome of a submitted statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement produced a rowset
    Rows(ResultSet),
    /// The statement produced no rowset; number of rows affected
    Affected(u64),
}

impl StatementOutcome {
    /// Row count recorded in the ledger
    pub fn row_count(&self) -> i64 {
        match self {
            StatementOutcome::Rows(rs) => rs.rows.len() as i64,
            StatementOutcome::Affected(n) => *n as i64,
        }
    }

    /// Consume into a result set; empty when no rowset was produced
    pub fn into_result_set(self) -> ResultSet {
        match self {
            StatementOutcome::Rows(rs) => rs,
            StatementOutcome::Affected(_) => ResultSet::default(),
        }
    }
}

/// The external query engine as seen by the catalog
pub trait QueryEngine: Send + Sync {
    /// Run a statement in its own unit of work. On failure that unit is rolled
    /// back and the engine's message is returned as [`Error::Statement`].
    ///
    /// [`Error::Statement`]: crate::error::Error::Statement
    fn submit(&self, sql: &str) -> Result<StatementOutcome>;

    /// Materialize the result of `sql` under `name` unless it already exists
    fn create_artifact_if_absent(&self, name: &str, sql: &str) -> Result<()>;

    /// Storage footprint of an artifact in bytes
    fn artifact_storage_bytes(&self, name: &str) -> Result<i64>;

    /// Drop an artifact; absence is not an error
    fn drop_artifact_if_exists(&self, name: &str) -> Result<()>;

    /// Read at most `limit` rows from an artifact
    fn read_artifact(&self, name: &str, limit: usize) -> Result<ResultSet>;
}

/// Strip trailing whitespace and statement terminators
pub fn normalize_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
