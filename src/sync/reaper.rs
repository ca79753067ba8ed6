//! Removal of aliases this engine no longer manages.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use tracing::{debug, info, warn};

use crate::alias::AliasGraph;
use crate::enforcer::{rejection_message, TableBackend};
use crate::snapshot::SnapshotStore;

pub struct StaleAliasReaper<'a> {
    graph: &'a AliasGraph,
    store: &'a SnapshotStore,
    backend: &'a dyn TableBackend,
}

impl<'a> StaleAliasReaper<'a> {
    pub fn new(graph: &'a AliasGraph, store: &'a SnapshotStore, backend: &'a dyn TableBackend) -> Self {
        Self {
            graph,
            store,
            backend,
        }
    }

    /// Remove table and files of every snapshotted alias outside `managed`.
    ///
    /// Only aliases that carry an ownership marker, or that are gone from the
    /// configuration entirely, are removed. Names without a snapshot (a lone
    /// download cache or state file) are not candidates. Returns the removed
    /// names.
    pub async fn reap(&self, managed: &HashSet<String>) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for (name, stored) in self.store.list()? {
            if managed.contains(&name) || !stored.has_snapshot {
                continue;
            }
            if !stored.has_marker && self.graph.contains(&name) {
                debug!("Alias {} is not managed and carries no marker, keeping it", name);
                continue;
            }

            info!("remove old alias {}", name);
            match self.backend.remove(&name).await {
                Ok(output) => {
                    if let Some(message) = rejection_message(&output, self.backend.rejection_prefix()) {
                        warn!("Alias {}: removing table failed: {}", name, message);
                    }
                }
                Err(e) => warn!("Alias {}: removing table failed: {:#}", name, e),
            }

            for file in &stored.files {
                if let Err(e) = fs::remove_file(file) {
                    warn!("Failed to remove {}: {}", file.display(), e);
                }
            }
            removed.push(name);
        }

        Ok(removed)
    }
}
