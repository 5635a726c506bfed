//! Artifact pinner

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::Lineage;
use crate::catalog::{artifact_name, ArtifactId, QueryId};
use crate::error::Result;

/// Result of pinning a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedView {
    pub view_id: ArtifactId,
    pub view_name: String,
    pub storage_bytes: i64,
}

impl Lineage {
    /// Materialize a recorded query as a named artifact and link it back to
    /// the ledger.
    ///
    /// Safe to retry: the engine creates the artifact only if it is absent and
    /// the catalog row is upserted by name, so pinning the same query again
    /// only refreshes the stored size. If the catalog write fails after the
    /// engine created the artifact, the artifact stays; pin again.
    pub fn pin(&self, query_id: QueryId) -> Result<PinnedView> {
        let sql = self.catalog.statement_text(query_id)?;
        let view_name = artifact_name(query_id);

        self.engine.create_artifact_if_absent(&view_name, &sql)?;
        let storage_bytes = self.engine.artifact_storage_bytes(&view_name)?;

        let view_id =
            self.catalog
                .record_artifact(query_id, &view_name, storage_bytes, Utc::now())?;

        info!(query_id, view_id, view = %view_name, storage_bytes, "pinned query");
        Ok(PinnedView {
            view_id,
            view_name,
            storage_bytes,
        })
    }
}
