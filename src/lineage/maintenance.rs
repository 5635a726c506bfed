//! Node deletion and catalog reset
//!
//! Both operations drop engine-side artifacts first and then commit the
//! catalog change in one transaction. A drop that succeeded is not undone if
//! the catalog transaction later fails; drops are idempotent, so the operation
//! can simply be retried.

use tracing::info;

use super::Lineage;
use crate::catalog::{DeleteOutcome, QueryId};
use crate::error::Result;

impl Lineage {
    /// Delete one query, its artifact and everything that hangs off it.
    /// Deleting an unknown id changes nothing.
    pub fn delete(&self, query_id: QueryId) -> Result<DeleteOutcome> {
        if let Some(artifact) = self.catalog.artifact_for_query(query_id)? {
            self.engine.drop_artifact_if_exists(&artifact.view_name)?;
        }

        let outcome = self.catalog.delete_query(query_id)?;
        info!(
            query_id,
            deleted = outcome.deleted,
            recycled = outcome.recycled,
            "deleted query"
        );
        Ok(outcome)
    }

    /// Drop every pinned artifact and empty the catalog. Identifier counters
    /// start over at 1.
    pub fn reset(&self) -> Result<()> {
        let names = self.catalog.artifact_names()?;
        for name in &names {
            self.engine.drop_artifact_if_exists(name)?;
        }

        self.catalog.truncate()?;
        info!(artifacts_dropped = names.len(), "reset catalog");
        Ok(())
    }
}
