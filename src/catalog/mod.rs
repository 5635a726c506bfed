//! Catalog module
//!
//! This module contains the catalog store, its schema and the row types.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::{Catalog, DeleteOutcome, NewExecution};
pub use types::{
    artifact_name, ArtifactId, ArtifactListing, EdgeKind, HistoryEntry, LineageEdge,
    LineageGraph, PinnedArtifact, QueryDetail, QueryId, QueryRecord, TableAssociation,
};
