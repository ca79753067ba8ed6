//! GeoIP aliases backed by per-country address files.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::ContentStrategy;
use crate::alias::{AliasDefinition, Proto, ResolvedContent};
use crate::snapshot::SnapshotStore;
use crate::validation::normalize_address;

/// Reads `<dir>/<CC>-IPv4` and `<dir>/<CC>-IPv6`.
///
/// The dataset itself is maintained elsewhere; an alias expires when the
/// dataset directory changed after the alias's snapshot was written.
#[derive(Debug)]
pub struct GeoIpStrategy {
    dir: PathBuf,
}

impl GeoIpStrategy {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn dataset_modified(&self) -> Option<DateTime<Utc>> {
        std::fs::metadata(&self.dir)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

#[async_trait]
impl ContentStrategy for GeoIpStrategy {
    async fn resolve(&self, alias: &AliasDefinition) -> Result<ResolvedContent> {
        if !self.dir.is_dir() {
            anyhow::bail!("GeoIP dataset not found in {}", self.dir.display());
        }

        let protos: &[Proto] = if alias.proto.is_empty() {
            &[Proto::Inet, Proto::Inet6]
        } else {
            &alias.proto
        };

        let mut content = ResolvedContent::new();
        for code in &alias.items {
            let code = code.trim().to_ascii_uppercase();
            if !is_country_code(&code) {
                warn!("Alias {}: invalid country code '{}'", alias.name, code);
                continue;
            }
            for proto in protos {
                let family = match proto {
                    Proto::Inet => "IPv4",
                    Proto::Inet6 => "IPv6",
                };
                let path = self.dir.join(format!("{}-{}", code, family));
                let text = match tokio::fs::read_to_string(&path).await {
                    Ok(text) => text,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!("Alias {}: no {} data for {}", alias.name, family, code);
                        continue;
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to read {}", path.display()))
                    }
                };
                for line in text.lines() {
                    if let Ok(entry) = normalize_address(line) {
                        content.insert(entry);
                    }
                }
            }
        }

        Ok(content)
    }

    fn cache_expires_at(
        &self,
        alias: &AliasDefinition,
        store: &SnapshotStore,
    ) -> Option<DateTime<Utc>> {
        let dataset = self.dataset_modified()?;
        match store.snapshot_modified(&alias.name) {
            Some(written) if written >= dataset => None,
            _ => Some(dataset),
        }
    }
}
