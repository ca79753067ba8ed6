//! Content resolution: own content per alias, then dependency merge.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::alias::{AliasDefinition, AliasGraph, ResolvedContent};
use crate::error::SyncError;
use crate::snapshot::SnapshotStore;
use crate::strategy::StrategyRegistry;

/// Number of aliases resolved concurrently in the first phase
const RESOLVE_CONCURRENCY: usize = 8;

/// Merged content of one alias and the staleness information behind it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub content: ResolvedContent,
    pub changed_at: DateTime<Utc>,
    /// Set when the alias's own source is past its refresh deadline
    pub expired: Option<DateTime<Utc>>,
    /// Highest watermark among the direct dependencies
    pub dependency_watermark: Option<DateTime<Utc>>,
}

impl Resolution {
    /// The alias's own watermark, ignoring dependencies.
    pub fn own_watermark(&self) -> DateTime<Utc> {
        self.expired.map_or(self.changed_at, |at| at.max(self.changed_at))
    }

    /// Latest relevant change, dependencies included.
    pub fn watermark(&self) -> DateTime<Utc> {
        let own = self.own_watermark();
        self.dependency_watermark.map_or(own, |dep| dep.max(own))
    }
}

/// Output of the first phase: every alias's own content.
///
/// Aliases whose resolve failed carry their cached content so dependents can
/// still merge something.
#[derive(Debug, Default)]
pub struct OwnContents {
    contents: HashMap<String, ResolvedContent>,
    failed: HashSet<String>,
}

impl OwnContents {
    pub fn get(&self, name: &str) -> Option<&ResolvedContent> {
        self.contents.get(name)
    }

    pub fn failed(&self, name: &str) -> bool {
        self.failed.contains(name)
    }
}

/// Produces `(content, watermark)` for aliases of one run.
pub struct ContentResolver<'a> {
    graph: &'a AliasGraph,
    registry: &'a StrategyRegistry,
    store: &'a SnapshotStore,
    targets: Option<&'a BTreeSet<String>>,
    now: DateTime<Utc>,
}

impl<'a> ContentResolver<'a> {
    pub fn new(
        graph: &'a AliasGraph,
        registry: &'a StrategyRegistry,
        store: &'a SnapshotStore,
        targets: Option<&'a BTreeSet<String>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            graph,
            registry,
            store,
            targets,
            now,
        }
    }

    pub fn is_targeted(&self) -> bool {
        self.targets.is_some()
    }

    /// Aliases outside the targeted set contribute cached content only.
    pub fn uses_cache(&self, name: &str) -> bool {
        self.targets.is_some_and(|targets| !targets.contains(name))
    }

    /// Phase one: own content of every alias in the graph.
    ///
    /// Fresh resolves run concurrently; a failure records `ResolveFailed` for
    /// that alias and falls back to its cached content.
    pub async fn resolve_own(&self) -> (OwnContents, Vec<SyncError>) {
        let results: Vec<(String, Result<ResolvedContent, SyncError>)> =
            stream::iter(self.graph.all())
                .map(|alias| async move { (alias.name.clone(), self.own_content(alias).await) })
                .buffer_unordered(RESOLVE_CONCURRENCY)
                .collect()
                .await;

        let mut own = OwnContents::default();
        let mut errors = Vec::new();
        for (name, result) in results {
            match result {
                Ok(content) => {
                    own.contents.insert(name, content);
                }
                Err(error) => {
                    warn!("{}", error);
                    if let Some(alias) = self.graph.get(&name) {
                        own.contents.insert(name.clone(), self.cached(alias));
                    }
                    own.failed.insert(name);
                    errors.push(error);
                }
            }
        }

        // Keep error order stable regardless of completion order
        errors.sort_by_key(|e| self.position(e.alias().unwrap_or_default()));
        (own, errors)
    }

    async fn own_content(&self, alias: &AliasDefinition) -> Result<ResolvedContent, SyncError> {
        if self.uses_cache(&alias.name) {
            debug!("Alias {}: using cached content", alias.name);
            return Ok(self.cached(alias));
        }

        self.registry
            .get(alias.kind)
            .resolve(alias)
            .await
            .map_err(|e| SyncError::ResolveFailed {
                alias: alias.name.clone(),
                message: format!("{:#}", e),
            })
    }

    fn cached(&self, alias: &AliasDefinition) -> ResolvedContent {
        self.registry.get(alias.kind).cached(alias, self.store)
    }

    fn position(&self, name: &str) -> usize {
        self.graph
            .all()
            .position(|alias| alias.name == name)
            .unwrap_or(usize::MAX)
    }

    fn expired(&self, alias: &AliasDefinition) -> Option<DateTime<Utc>> {
        self.registry.get(alias.kind).expired(alias, self.now)
    }

    /// Phase two input: own content merged with the direct dependencies.
    ///
    /// Only one level is expanded; dependencies of dependencies contribute
    /// neither content nor staleness.
    pub fn resolve(&self, alias: &AliasDefinition, own: &OwnContents) -> Resolution {
        let mut content = own.get(&alias.name).cloned().unwrap_or_default();
        let mut dependency_watermark: Option<DateTime<Utc>> = None;

        for name in self.graph.dependencies_of(&alias.name) {
            if name == alias.name {
                continue;
            }
            let Some(dependency) = self.graph.get(&name) else {
                debug!("Alias {}: dependency {} not configured", alias.name, name);
                continue;
            };

            if own.failed(&name) {
                warn!(
                    "Alias {}: dependency {} failed to resolve, using cached content",
                    alias.name, name
                );
            }
            if let Some(dep_content) = own.get(&name) {
                content.merge(dep_content);
            }

            let mut watermark = dependency.definition_changed_at;
            if let Some(expired) = self.expired(dependency) {
                watermark = watermark.max(expired);
            }
            dependency_watermark = Some(dependency_watermark.map_or(watermark, |w| w.max(watermark)));
        }

        Resolution {
            content,
            changed_at: alias.definition_changed_at,
            expired: self.expired(alias),
            dependency_watermark,
        }
    }
}
