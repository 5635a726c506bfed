//! SQLite query engine
//!
//! Runs user statements against the shared SQLite session and materializes
//! artifacts as tables created from their defining statement.

use rusqlite::{params, Connection, Params, Statement};
use tracing::{debug, warn};

use super::{normalize_statement, QueryEngine, ResultSet, Row, StatementOutcome, Value};
use crate::database::Database;
use crate::error::{Error, Result};

/// Query engine backed by the shared SQLite session
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    db: Database,
}

impl SqliteEngine {
    /// Create an engine over an open database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Check if a materialized artifact exists
    pub fn artifact_exists(&self, name: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        table_exists(&conn, name).map_err(Error::engine)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

fn total_changes(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
}

/// Drain a prepared statement into a result set
fn collect_rows<P: Params>(stmt: &mut Statement<'_>, params: P) -> rusqlite::Result<ResultSet> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params)?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        rows.push(Row::new(values));
    }

    Ok(ResultSet::new(columns, rows))
}

fn run_statement(conn: &Connection, sql: &str) -> rusqlite::Result<StatementOutcome> {
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() > 0 {
        return collect_rows(&mut stmt, []).map(StatementOutcome::Rows);
    }

    // `changes()` goes stale across DDL, so diff the running total instead
    let before = total_changes(conn)?;
    stmt.execute([])?;
    let after = total_changes(conn)?;
    Ok(StatementOutcome::Affected((after - before).max(0) as u64))
}

impl QueryEngine for SqliteEngine {
    fn submit(&self, sql: &str) -> Result<StatementOutcome> {
        let sql = normalize_statement(sql);
        if sql.is_empty() {
            return Err(Error::statement("empty statement"));
        }

        let conn = self.db.lock()?;
        conn.execute_batch("BEGIN").map_err(Error::statement)?;

        let result = run_statement(&conn, sql)
            .and_then(|outcome| conn.execute_batch("COMMIT").map(|_| outcome));

        match result {
            Ok(outcome) => {
                debug!(row_count = outcome.row_count(), "statement succeeded");
                Ok(outcome)
            }
            Err(err) => {
                if !conn.is_autocommit() {
                    if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                        warn!(error = %rollback_err, "rollback of failed statement failed");
                    }
                }
                Err(Error::statement(err))
            }
        }
    }

    fn create_artifact_if_absent(&self, name: &str, sql: &str) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} AS {}",
            quote_ident(name),
            normalize_statement(sql)
        );
        let conn = self.db.lock()?;
        conn.execute(&ddl, []).map_err(Error::engine)?;
        debug!(artifact = name, "materialized artifact");
        Ok(())
    }

    fn artifact_storage_bytes(&self, name: &str) -> Result<i64> {
        let conn = self.db.lock()?;
        let measured = conn.query_row(
            "SELECT COALESCE(SUM(pgsize), 0) FROM dbstat WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        );

        match measured {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                // builds without the dbstat table: fall back to the row payload
                debug!(error = %err, artifact = name, "dbstat unavailable, estimating size");
                let mut stmt = conn
                    .prepare(&format!("SELECT * FROM {}", quote_ident(name)))
                    .map_err(Error::engine)?;
                let rows = collect_rows(&mut stmt, []).map_err(Error::engine)?;
                Ok(rows.rows.iter().map(Row::encoded_len).sum::<usize>() as i64)
            }
        }
    }

    fn drop_artifact_if_exists(&self, name: &str) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])
            .map_err(Error::engine)?;
        debug!(artifact = name, "dropped artifact");
        Ok(())
    }

    fn read_artifact(&self, name: &str, limit: usize) -> Result<ResultSet> {
        let conn = self.db.lock()?;
        if !table_exists(&conn, name).map_err(Error::engine)? {
            return Err(Error::ArtifactNotFound(name.to_string()));
        }

        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} LIMIT ?1", quote_ident(name)))
            .map_err(Error::engine)?;
        collect_rows(&mut stmt, params![limit as i64]).map_err(Error::engine)
    }
}
