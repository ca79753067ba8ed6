//! Applies sync decisions to the snapshot directory and the live table.

use tracing::{debug, info};

use super::planner::{LiveAction, SyncDecision};
use super::resolver::Resolution;
use crate::alias::AliasDefinition;
use crate::enforcer::{rejection_message, TableBackend};
use crate::error::SyncError;
use crate::snapshot::{AliasState, SnapshotStore};

pub struct TableSynchronizer<'a> {
    store: &'a SnapshotStore,
    backend: &'a dyn TableBackend,
}

impl<'a> TableSynchronizer<'a> {
    pub fn new(store: &'a SnapshotStore, backend: &'a dyn TableBackend) -> Self {
        Self { store, backend }
    }

    /// Execute `decision` for `alias`.
    ///
    /// A failed snapshot write leaves the live table alone. Backend rejections
    /// are returned with the tool's prefix stripped.
    pub async fn apply(
        &self,
        alias: &AliasDefinition,
        resolution: &Resolution,
        decision: &SyncDecision,
    ) -> Result<(), SyncError> {
        if decision.is_noop() {
            debug!("Alias {}: {}", alias.name, decision.reason);
            return Ok(());
        }

        info!(
            "Alias {}: {} ({} -> {} entries)",
            alias.name, decision.reason, decision.current_size, decision.new_size
        );

        if decision.rewrite_snapshot {
            self.write_snapshot(alias, resolution)?;
        }

        let output = match decision.reload {
            LiveAction::Noop => return Ok(()),
            LiveAction::FlushEmpty => self.backend.flush(&alias.name).await,
            LiveAction::Replace => {
                let path = self.store.snapshot_path(&alias.name);
                self.backend.replace(&alias.name, &path).await
            }
        };

        let rejected = |message: String| SyncError::BackendRejected {
            alias: alias.name.clone(),
            message,
            current_size: decision.current_size,
            new_size: decision.new_size,
        };

        match output {
            Ok(output) => match rejection_message(&output, self.backend.rejection_prefix()) {
                Some(message) => Err(rejected(message)),
                None => {
                    if !output.is_empty() {
                        debug!("Alias {}: {}", alias.name, output);
                    }
                    Ok(())
                }
            },
            Err(e) => Err(rejected(format!("{:#}", e))),
        }
    }

    /// Keep the definition record of an alias whose table is not synchronized,
    /// so its change time stays stable for dependents.
    pub fn record_definition(&self, alias: &AliasDefinition) -> Result<(), SyncError> {
        if self.store.read_state(&alias.name, &alias.digest).is_some() {
            return Ok(());
        }
        let state = AliasState::new(alias.digest.clone(), alias.definition_changed_at);
        self.store
            .write_state(&alias.name, false, &state)
            .map_err(|e| SyncError::IoFailure {
                alias: alias.name.clone(),
                message: format!("{:#}", e),
            })
    }

    fn write_snapshot(&self, alias: &AliasDefinition, resolution: &Resolution) -> Result<(), SyncError> {
        let io_failure = |e: anyhow::Error| SyncError::IoFailure {
            alias: alias.name.clone(),
            message: format!("{:#}", e),
        };

        self.store
            .write_snapshot(&alias.name, &resolution.content)
            .map_err(io_failure)?;

        // The recorded change time never lies after the snapshot reflecting it
        let written = self
            .store
            .snapshot_modified(&alias.name)
            .unwrap_or(alias.definition_changed_at);
        let state = AliasState {
            digest: alias.digest.clone(),
            changed_at: alias.definition_changed_at.min(written),
            applied: Some(resolution.watermark()),
        };
        self.store
            .write_state(&alias.name, alias.managed, &state)
            .map_err(io_failure)
    }
}
