//! Turns configured aliases into [`AliasDefinition`]s.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use super::AliasDefinition;
use crate::config::Config;
use crate::snapshot::SnapshotStore;
use crate::strategy::StrategyRegistry;
use crate::validation::parse_interval;

/// Build the definitions of all enabled aliases, in source order.
///
/// Nested references are split off the literal content, `supported` comes from
/// the registry and the change time is recovered from the alias's recorded
/// state (marker or state file): an unchanged digest keeps the recorded time,
/// anything else counts as changed `now`.
pub fn load_definitions(
    config: &Config,
    registry: &StrategyRegistry,
    store: &SnapshotStore,
    now: DateTime<Utc>,
) -> Vec<AliasDefinition> {
    let names: HashSet<&str> = config.enabled_aliases().map(|a| a.name.as_str()).collect();

    config
        .enabled_aliases()
        .map(|cfg| {
            let mut dependencies = BTreeSet::new();
            let mut items = Vec::new();
            for item in &cfg.content {
                let item = item.trim();
                if item == cfg.name {
                    continue;
                }
                if cfg.kind.allows_nesting() && names.contains(item) {
                    dependencies.insert(item.to_string());
                } else {
                    items.push(item.to_string());
                }
            }

            let digest = cfg.digest();
            let definition_changed_at = store
                .read_state(&cfg.name, &digest)
                .map_or(now, |state| state.changed_at);

            let mut alias = AliasDefinition {
                name: cfg.name.clone(),
                kind: cfg.kind,
                managed: cfg.managed,
                supported: registry.supports(cfg.kind),
                dependencies,
                definition_changed_at,
                cache_expires_at: None,
                digest,
                items,
                urls: cfg.urls.clone(),
                ttl: cfg.ttl.as_deref().and_then(|t| parse_interval(t).ok()),
                proto: cfg.proto.clone(),
            };
            alias.cache_expires_at = registry.get(alias.kind).cache_expires_at(&alias, store);
            alias
        })
        .collect()
}
