//! Lineage service
//!
//! [`Lineage`] ties the catalog store to a query engine and exposes the
//! operations a front end needs: recording executions, pinning, deleting and
//! resetting, plus the read-side views of the ledger.

mod maintenance;
mod pinner;
mod recorder;

pub use pinner::PinnedView;
pub use recorder::Execution;

use std::sync::Arc;

use crate::catalog::{ArtifactListing, Catalog, HistoryEntry, LineageGraph, QueryDetail, QueryId};
use crate::config::Config;
use crate::database::Database;
use crate::engine::{QueryEngine, ResultSet, SqliteEngine};
use crate::error::{Error, Result};

/// The catalog and the engine it reaches into
pub struct Lineage {
    catalog: Catalog,
    engine: Arc<dyn QueryEngine>,
    config: Config,
}

impl Lineage {
    /// Create a lineage service from its parts
    pub fn new(catalog: Catalog, engine: Arc<dyn QueryEngine>, config: Config) -> Self {
        Self {
            catalog,
            engine,
            config,
        }
    }

    /// Open the configured database and use it both as catalog store and as
    /// query engine
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config)?;
        let catalog = Catalog::new(db.clone())?;
        let engine = Arc::new(SqliteEngine::new(db));
        Ok(Self::new(catalog, engine, config))
    }

    /// Get the catalog store
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Most recent records first; `None` uses the configured history limit
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        self.catalog
            .history(limit.unwrap_or(self.config.history_limit))
    }

    /// Full detail of one query
    pub fn detail(&self, query_id: QueryId) -> Result<QueryDetail> {
        self.catalog.detail(query_id)
    }

    /// Nodes and edges of the lineage graph
    pub fn graph(&self) -> Result<LineageGraph> {
        self.catalog.graph(self.config.graph_limit)
    }

    /// Every pinned artifact, newest first
    pub fn artifacts(&self) -> Result<Vec<ArtifactListing>> {
        self.catalog.artifacts()
    }

    /// Bounded rows from a pinned artifact. Only names the catalog tracks can be
    /// previewed.
    pub fn preview(&self, view_name: &str, limit: Option<usize>) -> Result<ResultSet> {
        if self.catalog.artifact_by_name(view_name)?.is_none() {
            return Err(Error::ArtifactNotFound(view_name.to_string()));
        }
        self.engine
            .read_artifact(view_name, limit.unwrap_or(self.config.preview_limit))
    }
}

impl std::fmt::Debug for Lineage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lineage")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
