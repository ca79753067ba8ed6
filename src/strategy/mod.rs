//! Content strategies: how each alias kind produces its entries.
//!
//! Strategies are wired up front in a [`StrategyRegistry`]; kinds without an
//! entry fall through to [`Unsupported`], which produces nothing and marks the
//! alias as read-only for the engine.

mod geoip;
mod static_list;
mod url;

pub use geoip::GeoIpStrategy;
pub use static_list::StaticStrategy;
pub use url::{parse_url_list, UrlStrategy};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::alias::{AliasDefinition, AliasKind, ResolvedContent};
use crate::config::Config;
use crate::snapshot::SnapshotStore;

/// Producer of alias content.
#[async_trait]
pub trait ContentStrategy: Send + Sync {
    /// Fresh content. May be slow (network, DNS) and fails only this alias.
    async fn resolve(&self, alias: &AliasDefinition) -> Result<ResolvedContent>;

    /// Last known content. Never fails: nothing cached means empty.
    fn cached(&self, alias: &AliasDefinition, store: &SnapshotStore) -> ResolvedContent {
        store.read_snapshot(&alias.name)
    }

    /// Deadline after which content must be refreshed, if the source is time bounded.
    fn cache_expires_at(
        &self,
        _alias: &AliasDefinition,
        _store: &SnapshotStore,
    ) -> Option<DateTime<Utc>> {
        None
    }

    /// `Some(now)` once the alias's refresh deadline has passed.
    fn expired(&self, alias: &AliasDefinition, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        alias
            .cache_expires_at
            .filter(|deadline| *deadline <= now)
            .map(|_| now)
    }
}

/// Default registry entry for kinds without a parser.
#[derive(Debug, Default)]
pub struct Unsupported;

#[async_trait]
impl ContentStrategy for Unsupported {
    async fn resolve(&self, _alias: &AliasDefinition) -> Result<ResolvedContent> {
        Ok(ResolvedContent::new())
    }

    fn cached(&self, _alias: &AliasDefinition, _store: &SnapshotStore) -> ResolvedContent {
        ResolvedContent::new()
    }
}

/// Static mapping from alias kind to content strategy.
pub struct StrategyRegistry {
    strategies: HashMap<AliasKind, Arc<dyn ContentStrategy>>,
    fallback: Arc<dyn ContentStrategy>,
}

impl StrategyRegistry {
    /// Registry with only the default entry.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Arc::new(Unsupported),
        }
    }

    /// The production wiring.
    pub fn standard(config: &Config, store: &SnapshotStore) -> Result<Self> {
        let mut registry = Self::new();

        let static_list: Arc<dyn ContentStrategy> = Arc::new(StaticStrategy::new());
        registry.register(AliasKind::Host, static_list.clone());
        registry.register(AliasKind::Network, static_list.clone());
        registry.register(AliasKind::NetworkGroup, static_list);

        let url: Arc<dyn ContentStrategy> = Arc::new(UrlStrategy::new(&config.fetch, store.clone())?);
        registry.register(AliasKind::Url, url.clone());
        registry.register(AliasKind::UrlTable, url);

        registry.register(
            AliasKind::GeoIp,
            Arc::new(GeoIpStrategy::new(config.geoip_dir.clone())),
        );

        Ok(registry)
    }

    pub fn register(&mut self, kind: AliasKind, strategy: Arc<dyn ContentStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    pub fn get(&self, kind: AliasKind) -> &dyn ContentStrategy {
        self.strategies
            .get(&kind)
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// A kind is supported when it has its own entry.
    pub fn supports(&self, kind: AliasKind) -> bool {
        self.strategies.contains_key(&kind)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
