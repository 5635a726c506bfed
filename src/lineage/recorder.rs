//! Execution recorder

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::Lineage;
use crate::catalog::{NewExecution, QueryId};
use crate::engine::{ResultSet, Row};
use crate::error::{Error, Result};
use crate::extract::extract_relations;

/// What `record_execution` hands back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub query_id: QueryId,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: Option<i64>,
    pub runtime_ms: i64,
    /// Present iff the statement failed
    pub error_message: Option<String>,
}

impl Execution {
    /// Check if the statement failed
    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Keep the first occurrence of every parent id
fn dedup_parents(parents: &[QueryId]) -> Vec<QueryId> {
    let mut seen = BTreeSet::new();
    parents.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn failure_message(err: Error) -> String {
    match err {
        Error::Statement(message) => message,
        other => other.to_string(),
    }
}

impl Lineage {
    /// Run a statement and record it in the ledger, successful or not.
    ///
    /// A failing statement is not an error here: it is rolled back in the
    /// engine, logged with its message and reported through
    /// [`Execution::error_message`]. Errors are returned only when the ledger
    /// write itself fails, in which case nothing was logged. Parent ids are
    /// written as-is; an unknown parent makes the ledger write fail.
    pub fn record_execution(&self, sql: &str, parents: &[QueryId]) -> Result<Execution> {
        let parents = dedup_parents(parents);
        let executed_at = Utc::now();
        let started = Instant::now();
        let outcome = self.engine.submit(sql);
        let runtime_ms = started.elapsed().as_millis() as i64;

        let (result, row_count, error_message) = match outcome {
            Ok(outcome) => {
                let row_count = outcome.row_count();
                (outcome.into_result_set(), Some(row_count), None)
            }
            Err(err) => {
                let message = failure_message(err);
                warn!(error = %message, "statement failed, recording the attempt");
                (ResultSet::default(), None, Some(message))
            }
        };

        let tables = match error_message {
            None => extract_relations(sql),
            Some(_) => BTreeSet::new(),
        };

        let query_id = self.catalog.log_execution(&NewExecution {
            sql_text: sql,
            executed_at,
            runtime_ms,
            row_count,
            error_message: error_message.as_deref(),
            tables: &tables,
            parents: &parents,
        })?;

        info!(
            query_id,
            runtime_ms,
            row_count = ?row_count,
            failed = error_message.is_some(),
            parents = ?parents,
            "recorded execution"
        );

        Ok(Execution {
            query_id,
            columns: result.columns,
            rows: result.rows,
            row_count,
            runtime_ms,
            error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_parents_keeps_order() {
        assert_eq!(dedup_parents(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup_parents(&[]).is_empty());
    }

    #[test]
    fn test_failure_message_strips_prefix() {
        assert_eq!(
            failure_message(Error::statement("no such table: actor")),
            "no such table: actor"
        );
        assert_eq!(
            failure_message(Error::Internal("lock".into())),
            "Internal error: lock"
        );
    }
}
