//! Alias definitions, resolved content and the dependency graph.

mod graph;
mod source;

pub use graph::AliasGraph;
pub use source::load_definitions;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Content-producing strategy of an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    /// Static list of addresses and host names
    Host,
    /// Static list of networks
    Network,
    /// Downloaded once, refreshed when the definition changes
    Url,
    /// Downloaded and refreshed every `ttl`
    UrlTable,
    /// Country based address ranges
    GeoIp,
    /// Group of other aliases
    NetworkGroup,
    /// Table maintained by another process
    External,
    /// Anything this engine has no parser for
    #[serde(other)]
    Unknown,
}

impl AliasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasKind::Host => "host",
            AliasKind::Network => "network",
            AliasKind::Url => "url",
            AliasKind::UrlTable => "urltable",
            AliasKind::GeoIp => "geoip",
            AliasKind::NetworkGroup => "networkgroup",
            AliasKind::External => "external",
            AliasKind::Unknown => "unknown",
        }
    }

    /// Kinds whose `content` may reference other aliases by name.
    pub fn allows_nesting(&self) -> bool {
        matches!(
            self,
            AliasKind::Host | AliasKind::Network | AliasKind::NetworkGroup
        )
    }
}

/// Address family selector for GeoIP aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Inet,
    Inet6,
}

/// One alias as seen by the synchronization engine.
#[derive(Debug, Clone)]
pub struct AliasDefinition {
    pub name: String,
    pub kind: AliasKind,
    /// This engine owns the snapshot and live table lifecycle
    pub managed: bool,
    /// A content strategy exists for `kind`
    pub supported: bool,
    /// Other aliases whose content is merged into this one (never contains `name`)
    pub dependencies: BTreeSet<String>,
    pub definition_changed_at: DateTime<Utc>,
    /// Refresh deadline of time-bounded sources
    pub cache_expires_at: Option<DateTime<Utc>>,
    /// SHA-256 of the normalized definition
    pub digest: String,
    /// Literal content items (alias references removed)
    pub items: Vec<String>,
    pub urls: Vec<String>,
    pub ttl: Option<Duration>,
    pub proto: Vec<Proto>,
}

impl AliasDefinition {
    /// Minimal definition, mostly useful for tests and programmatic callers.
    pub fn new(name: impl Into<String>, kind: AliasKind) -> Self {
        Self {
            name: name.into(),
            kind,
            managed: true,
            supported: true,
            dependencies: BTreeSet::new(),
            definition_changed_at: DateTime::<Utc>::MIN_UTC,
            cache_expires_at: None,
            digest: String::new(),
            items: Vec::new(),
            urls: Vec::new(),
            ttl: None,
            proto: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if name != self.name {
            self.dependencies.insert(name);
        }
        self
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn changed_at(mut self, at: DateTime<Utc>) -> Self {
        self.definition_changed_at = at;
        self
    }
}

/// Deduplicated set of table entries, kept sorted so snapshots diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedContent(BTreeSet<String>);

impl ResolvedContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: impl Into<String>) -> bool {
        self.0.insert(item.into())
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &ResolvedContent) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.contains(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Newline separated, sorted, no trailing newline.
    pub fn to_snapshot_text(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    /// Inverse of [`ResolvedContent::to_snapshot_text`]; blank lines are dropped.
    pub fn from_snapshot_text(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ResolvedContent {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_deduplicates() {
        let mut own: ResolvedContent = ["B", "C"].into_iter().collect();
        let dep: ResolvedContent = ["A", "B"].into_iter().collect();
        own.merge(&dep);
        assert_eq!(own.len(), 3);
        assert_eq!(own.to_snapshot_text(), "A\nB\nC");
    }

    #[test]
    fn test_snapshot_text_is_sorted() {
        let content: ResolvedContent = ["10.0.0.2", "10.0.0.10", "10.0.0.1"].into_iter().collect();
        assert_eq!(content.to_snapshot_text(), "10.0.0.1\n10.0.0.10\n10.0.0.2");
    }

    #[test]
    fn test_from_snapshot_text_skips_blank_lines() {
        let content = ResolvedContent::from_snapshot_text("a\n\n b \n\n");
        assert_eq!(content.len(), 2);
        assert!(content.contains("b"));
    }

    #[test]
    fn test_empty_content_renders_empty() {
        assert_eq!(ResolvedContent::new().to_snapshot_text(), "");
        assert!(ResolvedContent::from_snapshot_text("").is_empty());
    }

    #[test]
    fn test_with_dependency_ignores_self() {
        let alias = AliasDefinition::new("a", AliasKind::NetworkGroup)
            .with_dependency("a")
            .with_dependency("b");
        assert_eq!(alias.dependencies.len(), 1);
        assert!(alias.dependencies.contains("b"));
    }

    #[test]
    fn test_unknown_kind_deserializes() {
        let kind: AliasKind = serde_yaml::from_str("port").unwrap();
        assert_eq!(kind, AliasKind::Unknown);
        let kind: AliasKind = serde_yaml::from_str("urltable").unwrap();
        assert_eq!(kind, AliasKind::UrlTable);
    }

    #[test]
    fn test_nesting_kinds() {
        assert!(AliasKind::Host.allows_nesting());
        assert!(AliasKind::NetworkGroup.allows_nesting());
        assert!(!AliasKind::UrlTable.allows_nesting());
        assert!(!AliasKind::GeoIp.allows_nesting());
    }
}
