//! The synchronization pass.
//!
//! A run has two phases. First every alias's own content is produced
//! (concurrently, fresh or cached depending on the targeted set). Then, in
//! graph order, each supported alias is merged with its direct dependencies,
//! planned and applied immediately. A full run finishes by reaping aliases
//! that are no longer managed.

mod planner;
mod reaper;
mod resolver;
mod synchronizer;

pub use planner::{plan, LiveAction, SyncDecision, SyncReason};
pub use reaper::StaleAliasReaper;
pub use resolver::{ContentResolver, OwnContents, Resolution};
pub use synchronizer::TableSynchronizer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, warn};

use crate::alias::AliasGraph;
use crate::enforcer::TableBackend;
use crate::error::SyncError;
use crate::snapshot::SnapshotStore;
use crate::strategy::StrategyRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

/// Final output of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Everything a run did, for callers that need more than the result.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Decisions in graph order
    pub decisions: Vec<(String, SyncDecision)>,
    pub errors: Vec<SyncError>,
    /// Aliases removed by the reaper
    pub removed: Vec<String>,
}

impl RunReport {
    pub fn decision(&self, name: &str) -> Option<&SyncDecision> {
        self.decisions
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, decision)| decision)
    }

    /// Status and deduplicated messages.
    pub fn result(&self) -> RunResult {
        let mut messages: Vec<String> = Vec::new();
        for error in &self.errors {
            let message = error.to_string();
            if !messages.contains(&message) {
                messages.push(message);
            }
        }
        RunResult {
            status: if messages.is_empty() {
                RunStatus::Ok
            } else {
                RunStatus::Error
            },
            messages,
        }
    }
}

/// One synchronization pass over an alias graph.
pub struct SyncEngine<'a> {
    graph: &'a AliasGraph,
    registry: &'a StrategyRegistry,
    store: &'a SnapshotStore,
    backend: &'a dyn TableBackend,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        graph: &'a AliasGraph,
        registry: &'a StrategyRegistry,
        store: &'a SnapshotStore,
        backend: &'a dyn TableBackend,
    ) -> Self {
        Self {
            graph,
            registry,
            store,
            backend,
        }
    }

    /// Run a pass. `targets` restricts fresh resolution to the named aliases;
    /// `None` is a full run.
    pub async fn run(&self, targets: Option<&BTreeSet<String>>) -> RunReport {
        self.run_at(targets, Utc::now()).await
    }

    pub async fn run_at(&self, targets: Option<&BTreeSet<String>>, now: DateTime<Utc>) -> RunReport {
        if let Some(targets) = targets {
            for name in targets.iter().filter(|name| !self.graph.contains(name)) {
                warn!("Alias {} is not configured, ignoring", name);
            }
        }

        let resolver = ContentResolver::new(self.graph, self.registry, self.store, targets, now);
        let synchronizer = TableSynchronizer::new(self.store, self.backend);

        let (own, errors) = resolver.resolve_own().await;
        let mut report = RunReport {
            errors,
            ..Default::default()
        };
        let mut managed = HashSet::new();

        for alias in self.graph.all() {
            if alias.managed {
                managed.insert(alias.name.clone());
            }
            if !alias.supported {
                debug!("Alias {}: {} is not supported, leaving it alone", alias.name, alias.kind.as_str());
                if let Err(e) = synchronizer.record_definition(alias) {
                    warn!("{}", e);
                }
                continue;
            }
            if own.failed(&alias.name) {
                continue;
            }

            let resolution = resolver.resolve(alias, &own);
            let loaded_size = self.backend.loaded_size(&resolution.content);
            let current_size = if resolver.is_targeted() {
                loaded_size
            } else {
                match self.backend.current_size(&alias.name).await {
                    Ok(size) => size,
                    Err(e) => {
                        warn!("Alias {}: cannot query live table: {:#}", alias.name, e);
                        0
                    }
                }
            };

            let decision = plan(
                &resolution,
                self.store.snapshot_written(&alias.name, &alias.digest),
                current_size,
                loaded_size,
            );
            if let Err(e) = synchronizer.apply(alias, &resolution, &decision).await {
                warn!("{}", e);
                report.errors.push(e);
            }
            report.decisions.push((alias.name.clone(), decision));
        }

        if !resolver.is_targeted() {
            let reaper = StaleAliasReaper::new(self.graph, self.store, self.backend);
            match reaper.reap(&managed).await {
                Ok(removed) => report.removed = removed,
                Err(e) => error!("Cleanup of old aliases failed: {:#}", e),
            }
        }

        report
    }
}
