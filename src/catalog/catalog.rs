//! Catalog store for QLE
//!
//! This module owns every catalog row. Each public write is a single
//! transaction on the shared session; reads lock the session once and never
//! call back into other locking methods.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::schema;
use super::types::{
    ArtifactId, ArtifactListing, EdgeKind, HistoryEntry, LineageEdge, LineageGraph,
    PinnedArtifact, QueryDetail, QueryId, QueryRecord, TableAssociation,
};
use crate::database::Database;
use crate::error::{Error, Result};

const QUERY_COLUMNS: &str =
    "query_id, sql_text, executed_at, runtime_ms, row_count, error_message, pinned_view_id";

const ARTIFACT_COLUMNS: &str =
    "pv.view_id, pv.query_id, pv.view_name, pv.storage_bytes, pv.created_at";

/// A finished execution, ready to be written to the ledger
#[derive(Debug, Clone)]
pub struct NewExecution<'a> {
    pub sql_text: &'a str,
    pub executed_at: DateTime<Utc>,
    pub runtime_ms: i64,
    pub row_count: Option<i64>,
    pub error_message: Option<&'a str>,
    /// Relation names; ignored for failed executions
    pub tables: &'a BTreeSet<String>,
    pub parents: &'a [QueryId],
}

/// What a node deletion changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The ledger row existed and was removed
    pub deleted: bool,
    /// The ledger became empty and identifier counters were reset
    pub recycled: bool,
}

impl ToSql for EdgeKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EdgeKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}

fn query_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueryRecord> {
    Ok(QueryRecord {
        query_id: row.get("query_id")?,
        sql_text: row.get("sql_text")?,
        executed_at: row.get("executed_at")?,
        runtime_ms: row.get("runtime_ms")?,
        row_count: row.get("row_count")?,
        error_message: row.get("error_message")?,
        pinned_view_id: row.get("pinned_view_id")?,
    })
}

fn artifact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PinnedArtifact> {
    Ok(PinnedArtifact {
        view_id: row.get("view_id")?,
        query_id: row.get("query_id")?,
        view_name: row.get("view_name")?,
        storage_bytes: row.get("storage_bytes")?,
        created_at: row.get("created_at")?,
    })
}

fn load_query(conn: &Connection, query_id: QueryId) -> Result<Option<QueryRecord>> {
    let sql = format!("SELECT {} FROM qle_query WHERE query_id = ?1", QUERY_COLUMNS);
    Ok(conn
        .query_row(&sql, params![query_id], query_from_row)
        .optional()?)
}

fn load_tables(conn: &Connection, query_id: QueryId) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT table_name FROM qle_query_table WHERE query_id = ?1 ORDER BY table_name",
    )?;
    let tables = stmt
        .query_map(params![query_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tables)
}

fn load_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM qle_query ORDER BY executed_at DESC, query_id DESC LIMIT ?1",
        QUERY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params![limit as i64], query_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    records
        .into_iter()
        .map(|record| {
            let tables = load_tables(conn, record.query_id)?;
            Ok(HistoryEntry { record, tables })
        })
        .collect()
}

fn load_edges(conn: &Connection) -> Result<Vec<LineageEdge>> {
    let mut stmt = conn.prepare(
        "SELECT parent_query_id, child_query_id, edge_type FROM qle_edge \
         ORDER BY child_query_id, parent_query_id",
    )?;
    let edges = stmt
        .query_map([], |row| {
            Ok(LineageEdge {
                parent_query_id: row.get(0)?,
                child_query_id: row.get(1)?,
                edge_type: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Catalog store - the query ledger and everything hanging off it
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Open the catalog on a database, creating its relations if needed
    pub fn new(db: Database) -> Result<Self> {
        schema::init_schema(&*db.lock()?)?;
        Ok(Self { db })
    }

    /// Write one execution: the ledger row, its table associations and its
    /// lineage edges commit together or not at all.
    pub fn log_execution(&self, entry: &NewExecution<'_>) -> Result<QueryId> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO qle_query (sql_text, executed_at, runtime_ms, row_count, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.sql_text,
                entry.executed_at,
                entry.runtime_ms,
                entry.row_count,
                entry.error_message
            ],
        )?;
        let query_id = tx.last_insert_rowid();

        if entry.error_message.is_none() {
            let mut stmt =
                tx.prepare("INSERT INTO qle_query_table (query_id, table_name) VALUES (?1, ?2)")?;
            for table in entry.tables {
                stmt.execute(params![query_id, table])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO qle_edge (parent_query_id, child_query_id, edge_type) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for parent in entry.parents {
                stmt.execute(params![parent, query_id, EdgeKind::Derived])?;
            }
        }

        tx.commit()?;
        Ok(query_id)
    }

    /// Upsert the artifact row for a query and link the query to it.
    pub fn record_artifact(
        &self,
        query_id: QueryId,
        view_name: &str,
        storage_bytes: i64,
        created_at: DateTime<Utc>,
    ) -> Result<ArtifactId> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let view_id: ArtifactId = tx.query_row(
            "INSERT INTO qle_pinned_view (query_id, view_name, storage_bytes, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (view_name) DO UPDATE SET storage_bytes = excluded.storage_bytes \
             RETURNING view_id",
            params![query_id, view_name, storage_bytes, created_at],
            |row| row.get(0),
        )?;

        let linked = tx.execute(
            "UPDATE qle_query SET pinned_view_id = ?1 WHERE query_id = ?2",
            params![view_id, query_id],
        )?;
        if linked == 0 {
            // dropping `tx` rolls the upsert back
            return Err(Error::QueryNotFound(query_id));
        }

        tx.commit()?;
        Ok(view_id)
    }

    /// Delete one ledger row together with its artifact row. Associations and
    /// edges go by cascade. Recycles identifiers if the ledger ends up empty.
    pub fn delete_query(&self, query_id: QueryId) -> Result<DeleteOutcome> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE qle_query SET pinned_view_id = NULL WHERE pinned_view_id IN \
             (SELECT view_id FROM qle_pinned_view WHERE query_id = ?1)",
            params![query_id],
        )?;
        tx.execute(
            "DELETE FROM qle_pinned_view WHERE query_id = ?1",
            params![query_id],
        )?;
        let deleted = tx.execute("DELETE FROM qle_query WHERE query_id = ?1", params![query_id])?;
        let recycled = schema::recycle_identifiers_if_empty(&tx)?;

        tx.commit()?;
        debug!(query_id, deleted, recycled, "deleted ledger row");
        Ok(DeleteOutcome {
            deleted: deleted > 0,
            recycled,
        })
    }

    /// Remove every catalog row and reset identifier counters.
    pub fn truncate(&self) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM qle_edge;
             DELETE FROM qle_query_table;
             UPDATE qle_query SET pinned_view_id = NULL;
             DELETE FROM qle_pinned_view;
             DELETE FROM qle_query;",
        )?;
        schema::reset_identifier_counters(&tx)?;

        tx.commit()?;
        Ok(())
    }

    /// Get a query record
    pub fn get_query(&self, query_id: QueryId) -> Result<Option<QueryRecord>> {
        let conn = self.db.lock()?;
        load_query(&conn, query_id)
    }

    /// Get the statement text of a query
    pub fn statement_text(&self, query_id: QueryId) -> Result<String> {
        self.get_query(query_id)?
            .map(|record| record.sql_text)
            .ok_or(Error::QueryNotFound(query_id))
    }

    /// Number of rows in the ledger
    pub fn query_count(&self) -> Result<i64> {
        let conn = self.db.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM qle_query", [], |row| row.get(0))?)
    }

    /// Relation names associated with a query
    pub fn tables_for(&self, query_id: QueryId) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        load_tables(&conn, query_id)
    }

    /// Table association rows of a query
    pub fn associations(&self, query_id: QueryId) -> Result<Vec<TableAssociation>> {
        Ok(self
            .tables_for(query_id)?
            .into_iter()
            .map(|table_name| TableAssociation {
                query_id,
                table_name,
            })
            .collect())
    }

    /// Most recent records first, each with its relation names
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.db.lock()?;
        load_history(&conn, limit)
    }

    /// Record, associations and linked artifact of one query
    pub fn detail(&self, query_id: QueryId) -> Result<QueryDetail> {
        let conn = self.db.lock()?;
        let record = load_query(&conn, query_id)?.ok_or(Error::QueryNotFound(query_id))?;
        let tables = load_tables(&conn, query_id)?;

        let sql = format!(
            "SELECT {} FROM qle_pinned_view pv \
             JOIN qle_query q ON q.pinned_view_id = pv.view_id \
             WHERE q.query_id = ?1",
            ARTIFACT_COLUMNS
        );
        let pinned = conn
            .query_row(&sql, params![query_id], artifact_from_row)
            .optional()?;

        Ok(QueryDetail {
            record,
            tables,
            pinned,
        })
    }

    /// All lineage edges
    pub fn edges(&self) -> Result<Vec<LineageEdge>> {
        let conn = self.db.lock()?;
        load_edges(&conn)
    }

    /// Up to `node_limit` most recent nodes and every edge
    pub fn graph(&self, node_limit: usize) -> Result<LineageGraph> {
        let conn = self.db.lock()?;
        Ok(LineageGraph {
            nodes: load_history(&conn, node_limit)?,
            edges: load_edges(&conn)?,
        })
    }

    /// Artifact row owned by a query
    pub fn artifact_for_query(&self, query_id: QueryId) -> Result<Option<PinnedArtifact>> {
        let conn = self.db.lock()?;
        let sql = format!(
            "SELECT {} FROM qle_pinned_view pv WHERE pv.query_id = ?1",
            ARTIFACT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![query_id], artifact_from_row)
            .optional()?)
    }

    /// Artifact row by name
    pub fn artifact_by_name(&self, view_name: &str) -> Result<Option<PinnedArtifact>> {
        let conn = self.db.lock()?;
        let sql = format!(
            "SELECT {} FROM qle_pinned_view pv WHERE pv.view_name = ?1",
            ARTIFACT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![view_name], artifact_from_row)
            .optional()?)
    }

    /// Names of every pinned artifact
    pub fn artifact_names(&self) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT view_name FROM qle_pinned_view ORDER BY view_id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Every artifact with its originating query, newest first
    pub fn artifacts(&self) -> Result<Vec<ArtifactListing>> {
        let conn = self.db.lock()?;
        let sql = format!(
            "SELECT {}, q.executed_at, q.sql_text FROM qle_pinned_view pv \
             JOIN qle_query q ON q.query_id = pv.query_id \
             ORDER BY pv.created_at DESC, pv.view_id DESC",
            ARTIFACT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let listings = stmt
            .query_map([], |row| {
                Ok(ArtifactListing {
                    artifact: artifact_from_row(row)?,
                    executed_at: row.get("executed_at")?,
                    sql_text: row.get("sql_text")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(Database::open_in_memory().unwrap()).unwrap()
    }

    fn log(catalog: &Catalog, sql: &str, error: Option<&str>, parents: &[QueryId]) -> QueryId {
        let tables = crate::extract::extract_relations(sql);
        catalog
            .log_execution(&NewExecution {
                sql_text: sql,
                executed_at: Utc::now(),
                runtime_ms: 1,
                row_count: error.is_none().then_some(1),
                error_message: error,
                tables: &tables,
                parents,
            })
            .unwrap()
    }

    #[test]
    fn test_log_execution() {
        let catalog = catalog();
        let first = log(&catalog, "SELECT 1", None, &[]);
        let second = log(&catalog, "SELECT * FROM actor JOIN title", None, &[first]);

        assert_eq!((first, second), (1, 2));
        assert_eq!(catalog.tables_for(second).unwrap(), vec!["actor", "title"]);
        assert_eq!(
            catalog.edges().unwrap(),
            vec![LineageEdge {
                parent_query_id: 1,
                child_query_id: 2,
                edge_type: EdgeKind::Derived,
            }]
        );
    }

    #[test]
    fn test_reads_release_the_session() {
        let catalog = catalog();
        let first = log(&catalog, "SELECT * FROM actor", None, &[]);
        let second = log(&catalog, "SELECT * FROM film", None, &[first]);

        // each read locks and releases the shared session in turn
        let record = catalog.get_query(second).unwrap().unwrap();
        assert_eq!(record.sql_text, "SELECT * FROM film");
        assert_eq!(catalog.tables_for(first).unwrap(), vec!["actor"]);
        assert_eq!(catalog.history(1).unwrap()[0].record.query_id, second);
        assert_eq!(catalog.edges().unwrap().len(), 1);
        assert!(catalog.get_query(99).unwrap().is_none());
        assert_eq!(catalog.statement_text(first).unwrap(), "SELECT * FROM actor");
    }

    #[test]
    fn test_failed_execution_has_no_tables() {
        let catalog = catalog();
        let id = log(&catalog, "SELECT * FROM missing", Some("no such table"), &[]);

        let detail = catalog.detail(id).unwrap();
        assert!(detail.record.is_failed());
        assert!(detail.tables.is_empty());
    }

    #[test]
    fn test_dangling_parent_logs_nothing() {
        let catalog = catalog();
        let tables = BTreeSet::new();
        let result = catalog.log_execution(&NewExecution {
            sql_text: "SELECT 1",
            executed_at: Utc::now(),
            runtime_ms: 0,
            row_count: Some(1),
            error_message: None,
            tables: &tables,
            parents: &[99],
        });

        assert!(matches!(result, Err(Error::Catalog(_))));
        assert_eq!(catalog.query_count().unwrap(), 0);
        assert_eq!(log(&catalog, "SELECT 1", None, &[]), 1);
    }

    #[test]
    fn test_record_artifact_upserts() {
        let catalog = catalog();
        let id = log(&catalog, "SELECT 1", None, &[]);

        let first = catalog.record_artifact(id, "qle_view_1", 100, Utc::now()).unwrap();
        let second = catalog.record_artifact(id, "qle_view_1", 200, Utc::now()).unwrap();
        assert_eq!(first, second);

        let detail = catalog.detail(id).unwrap();
        let pinned = detail.pinned.unwrap();
        assert_eq!(pinned.storage_bytes, 200);
        assert_eq!(detail.record.pinned_view_id, Some(first));
        assert_eq!(catalog.artifact_names().unwrap(), vec!["qle_view_1"]);
    }

    #[test]
    fn test_record_artifact_unknown_query() {
        let catalog = catalog();
        let result = catalog.record_artifact(5, "qle_view_5", 1, Utc::now());
        assert!(result.is_err());
        assert!(catalog.artifact_names().unwrap().is_empty());
    }

    #[test]
    fn test_history_order_and_limit() {
        let catalog = catalog();
        for _ in 0..3 {
            log(&catalog, "SELECT 1", None, &[]);
        }

        let ids: Vec<_> = catalog
            .history(2)
            .unwrap()
            .into_iter()
            .map(|e| e.record.query_id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_delete_and_recycle() {
        let catalog = catalog();
        let a = log(&catalog, "SELECT 1", None, &[]);
        let b = log(&catalog, "SELECT 2", None, &[a]);
        catalog.record_artifact(b, "qle_view_2", 1, Utc::now()).unwrap();

        let outcome = catalog.delete_query(a).unwrap();
        assert_eq!(
            outcome,
            DeleteOutcome {
                deleted: true,
                recycled: false
            }
        );
        assert!(catalog.edges().unwrap().is_empty());

        let outcome = catalog.delete_query(b).unwrap();
        assert!(outcome.deleted && outcome.recycled);
        assert!(catalog.artifact_names().unwrap().is_empty());

        assert_eq!(log(&catalog, "SELECT 3", None, &[]), 1);
        assert_eq!(
            catalog.record_artifact(1, "qle_view_1", 1, Utc::now()).unwrap(),
            1
        );
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let catalog = catalog();
        log(&catalog, "SELECT 1", None, &[]);
        let outcome = catalog.delete_query(42).unwrap();
        assert!(!outcome.deleted);
        assert!(!outcome.recycled);
        assert_eq!(catalog.query_count().unwrap(), 1);
    }

    #[test]
    fn test_truncate() {
        let catalog = catalog();
        let a = log(&catalog, "SELECT * FROM actor", None, &[]);
        log(&catalog, "SELECT 2", None, &[a]);
        catalog.record_artifact(a, "qle_view_1", 1, Utc::now()).unwrap();

        catalog.truncate().unwrap();

        assert_eq!(catalog.query_count().unwrap(), 0);
        assert!(catalog.edges().unwrap().is_empty());
        assert!(catalog.artifacts().unwrap().is_empty());
        assert_eq!(log(&catalog, "SELECT 1", None, &[]), 1);
    }
}
