//! Catalog schema
//!
//! Four relations: the query ledger, its table associations, lineage edges and
//! pinned artifacts. Associations, edges and the artifact row cascade from the
//! ledger; the ledger's artifact back-reference is nulled when the artifact row
//! goes away.

use rusqlite::{Connection, Transaction};

use crate::error::Result;

pub const QUERY_TABLE: &str = "qle_query";
pub const ASSOCIATION_TABLE: &str = "qle_query_table";
pub const EDGE_TABLE: &str = "qle_edge";
pub const ARTIFACT_TABLE: &str = "qle_pinned_view";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS qle_query (
      query_id INTEGER PRIMARY KEY AUTOINCREMENT,
      sql_text TEXT NOT NULL,
      executed_at TEXT NOT NULL,
      runtime_ms INTEGER NOT NULL,
      row_count INTEGER,
      error_message TEXT,
      pinned_view_id INTEGER REFERENCES qle_pinned_view(view_id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_qle_query_executed ON qle_query(executed_at);

    CREATE TABLE IF NOT EXISTS qle_query_table (
      query_id INTEGER NOT NULL REFERENCES qle_query(query_id) ON DELETE CASCADE,
      table_name TEXT NOT NULL,
      PRIMARY KEY (query_id, table_name)
    );

    CREATE TABLE IF NOT EXISTS qle_edge (
      parent_query_id INTEGER NOT NULL REFERENCES qle_query(query_id) ON DELETE CASCADE,
      child_query_id INTEGER NOT NULL REFERENCES qle_query(query_id) ON DELETE CASCADE,
      edge_type TEXT NOT NULL DEFAULT 'derived',
      PRIMARY KEY (parent_query_id, child_query_id, edge_type)
    );
    CREATE INDEX IF NOT EXISTS idx_qle_edge_child ON qle_edge(child_query_id);

    CREATE TABLE IF NOT EXISTS qle_pinned_view (
      view_id INTEGER PRIMARY KEY AUTOINCREMENT,
      query_id INTEGER NOT NULL REFERENCES qle_query(query_id) ON DELETE CASCADE,
      view_name TEXT NOT NULL UNIQUE,
      storage_bytes INTEGER NOT NULL,
      created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_qle_pinned_view_query ON qle_pinned_view(query_id);
"#;

/// Create the catalog relations if they do not exist yet
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Reset the query and artifact identifier counters so the next rows get id 1.
pub fn reset_identifier_counters(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "DELETE FROM sqlite_sequence WHERE name IN (?1, ?2)",
        [QUERY_TABLE, ARTIFACT_TABLE],
    )?;
    Ok(())
}

/// Apply identifier recycling if the ledger is empty. Returns whether the
/// counters were reset.
pub fn recycle_identifiers_if_empty(tx: &Transaction<'_>) -> Result<bool> {
    let remaining: i64 = tx.query_row("SELECT COUNT(*) FROM qle_query", [], |row| row.get(0))?;
    if remaining > 0 {
        return Ok(false);
    }
    reset_identifier_counters(tx)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn insert_query(conn: &Connection) -> i64 {
        conn.execute(
            "INSERT INTO qle_query (sql_text, executed_at, runtime_ms) VALUES ('SELECT 1', '2024-01-01', 0)",
            [],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = conn();
        init_schema(&conn).unwrap();

        for table in [QUERY_TABLE, ASSOCIATION_TABLE, EDGE_TABLE, ARTIFACT_TABLE] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_cascade_from_query() {
        let conn = conn();
        let a = insert_query(&conn);
        let b = insert_query(&conn);
        conn.execute(
            "INSERT INTO qle_edge (parent_query_id, child_query_id) VALUES (?1, ?2)",
            [a, b],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO qle_query_table (query_id, table_name) VALUES (?1, 'actor')",
            [a],
        )
        .unwrap();

        conn.execute("DELETE FROM qle_query WHERE query_id = ?1", [a])
            .unwrap();

        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM qle_edge", [], |r| r.get(0))
            .unwrap();
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM qle_query_table", [], |r| r.get(0))
            .unwrap();
        assert_eq!((edges, tables), (0, 0));
    }

    #[test]
    fn test_artifact_delete_clears_link() {
        let conn = conn();
        let a = insert_query(&conn);
        conn.execute(
            "INSERT INTO qle_pinned_view (query_id, view_name, storage_bytes, created_at) VALUES (?1, 'qle_view_1', 0, '2024-01-01')",
            [a],
        )
        .unwrap();
        let view_id = conn.last_insert_rowid();
        conn.execute("UPDATE qle_query SET pinned_view_id = ?1", [view_id])
            .unwrap();

        conn.execute("DELETE FROM qle_pinned_view", []).unwrap();

        let link: Option<i64> = conn
            .query_row("SELECT pinned_view_id FROM qle_query", [], |r| r.get(0))
            .unwrap();
        assert_eq!(link, None);
    }

    #[test]
    fn test_recycle_only_when_empty() {
        let mut conn = conn();
        insert_query(&conn);
        insert_query(&conn);

        let tx = conn.transaction().unwrap();
        tx.execute("DELETE FROM qle_query WHERE query_id = 2", [])
            .unwrap();
        assert!(!recycle_identifiers_if_empty(&tx).unwrap());
        tx.execute("DELETE FROM qle_query", []).unwrap();
        assert!(recycle_identifiers_if_empty(&tx).unwrap());
        tx.commit().unwrap();

        assert_eq!(insert_query(&conn), 1);
    }
}
