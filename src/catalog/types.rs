//! Catalog row types for QLE
//!
//! This module defines the rows held by the catalog store: query records,
//! table associations, lineage edges and pinned artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identifier of a query record
pub type QueryId = i64;

/// Identifier of a pinned artifact
pub type ArtifactId = i64;

/// Prefix of every artifact name
pub const ARTIFACT_PREFIX: &str = "qle_view_";

/// Derive the artifact name for a query. Re-pinning the same query always
/// targets the same artifact.
pub fn artifact_name(query_id: QueryId) -> String {
    format!("{}{}", ARTIFACT_PREFIX, query_id)
}

/// One submitted statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: QueryId,
    pub sql_text: String,
    pub executed_at: DateTime<Utc>,
    pub runtime_ms: i64,
    /// Rows returned or affected; meaningful only when `error_message` is null
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
    pub pinned_view_id: Option<ArtifactId>,
}

impl QueryRecord {
    /// Check if the statement failed
    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}

/// A relation referenced by a successful query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAssociation {
    pub query_id: QueryId,
    pub table_name: String,
}

/// Kind of a lineage edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// The child query was written starting from the parent
    Derived,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Derived => "derived",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "derived" => Ok(EdgeKind::Derived),
            other => Err(Error::CorruptedRow(format!("unknown edge type '{}'", other))),
        }
    }
}

/// Directed arc from a parent query to a child query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub parent_query_id: QueryId,
    pub child_query_id: QueryId,
    pub edge_type: EdgeKind,
}

/// A query result materialized in the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedArtifact {
    pub view_id: ArtifactId,
    pub query_id: QueryId,
    pub view_name: String,
    pub storage_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry annotated with its relation names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: QueryRecord,
    pub tables: Vec<String>,
}

/// Everything the catalog knows about one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDetail {
    pub record: QueryRecord,
    pub tables: Vec<String>,
    pub pinned: Option<PinnedArtifact>,
}

/// Nodes and arcs of the lineage graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub nodes: Vec<HistoryEntry>,
    pub edges: Vec<LineageEdge>,
}

impl LineageGraph {
    /// Parents of a node, in edge order
    pub fn parents_of(&self, query_id: QueryId) -> Vec<QueryId> {
        self.edges
            .iter()
            .filter(|e| e.child_query_id == query_id)
            .map(|e| e.parent_query_id)
            .collect()
    }

    /// Children of a node, in edge order
    pub fn children_of(&self, query_id: QueryId) -> Vec<QueryId> {
        self.edges
            .iter()
            .filter(|e| e.parent_query_id == query_id)
            .map(|e| e.child_query_id)
            .collect()
    }
}

/// A pinned artifact joined with the query that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactListing {
    #[serde(flatten)]
    pub artifact: PinnedArtifact,
    pub executed_at: DateTime<Utc>,
    pub sql_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(2), "qle_view_2");
        assert_eq!(artifact_name(2), artifact_name(2));
    }

    #[test]
    fn test_edge_kind_parse() {
        assert_eq!("derived".parse::<EdgeKind>().unwrap(), EdgeKind::Derived);
        assert!("copied".parse::<EdgeKind>().is_err());
        assert_eq!(EdgeKind::Derived.to_string(), "derived");
    }

    #[test]
    fn test_graph_neighbours() {
        let edge = |p, c| LineageEdge {
            parent_query_id: p,
            child_query_id: c,
            edge_type: EdgeKind::Derived,
        };
        let graph = LineageGraph {
            nodes: Vec::new(),
            edges: vec![edge(1, 2), edge(1, 3), edge(2, 3)],
        };

        assert_eq!(graph.children_of(1), vec![2, 3]);
        assert_eq!(graph.parents_of(3), vec![1, 2]);
        assert!(graph.parents_of(1).is_empty());
    }
}
