//! URL fed aliases (`url`, `urltable`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ContentStrategy;
use crate::alias::{AliasDefinition, ResolvedContent};
use crate::config::FetchConfig;
use crate::snapshot::SnapshotStore;
use crate::utils::format_count;
use crate::validation::normalize_address;

const RETRY_DELAY_MS: u64 = 2000;

/// Downloads address lists and keeps the last download as a cache.
///
/// A cached download is reused until it expires (`ttl`) or the alias
/// definition changes after it was written.
pub struct UrlStrategy {
    client: Client,
    store: SnapshotStore,
    max_retries: u32,
    max_size: usize,
}

impl UrlStrategy {
    pub fn new(fetch: &FetchConfig, store: SnapshotStore) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .user_agent(format!("tablesync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            store,
            max_retries: fetch.max_retries,
            max_size: fetch.max_size,
        })
    }

    /// Cached download, if still usable for `alias`.
    fn fresh_cache(&self, alias: &AliasDefinition, now: DateTime<Utc>) -> Option<ResolvedContent> {
        let written = self.store.cache_modified(&alias.name)?;
        if alias.definition_changed_at > written {
            return None;
        }
        if alias.cache_expires_at.is_some_and(|deadline| deadline <= now) {
            return None;
        }
        self.store.read_cache(&alias.name)
    }

    /// Fetch content with retry logic and size validation
    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        if let Some(content_length) = response.content_length() {
                            if content_length as usize > self.max_size {
                                anyhow::bail!(
                                    "Response too large: {} bytes (max: {} bytes)",
                                    content_length,
                                    self.max_size
                                );
                            }
                        }

                        let body = response
                            .text()
                            .await
                            .context("Failed to read response body")?;

                        if body.len() > self.max_size {
                            anyhow::bail!(
                                "Downloaded content too large: {} bytes (max: {} bytes)",
                                body.len(),
                                self.max_size
                            );
                        }

                        return Ok(body);
                    }
                    last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

#[async_trait]
impl ContentStrategy for UrlStrategy {
    async fn resolve(&self, alias: &AliasDefinition) -> Result<ResolvedContent> {
        if let Some(cached) = self.fresh_cache(alias, Utc::now()) {
            debug!("Alias {}: using cached download", alias.name);
            return Ok(cached);
        }

        let mut content = ResolvedContent::new();
        for url in &alias.urls {
            info!("Fetching {} for alias {}...", url, alias.name);
            let body = self
                .fetch_with_retry(url)
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            let entries = parse_url_list(&body);
            info!("Fetched {} - {} entries", url, format_count(entries.len()));
            content.merge(&entries);
        }

        if let Err(e) = self.store.write_cache(&alias.name, &content) {
            warn!("Alias {}: cannot store download cache: {:#}", alias.name, e);
        }
        Ok(content)
    }

    fn cache_expires_at(
        &self,
        alias: &AliasDefinition,
        store: &SnapshotStore,
    ) -> Option<DateTime<Utc>> {
        match store.cache_modified(&alias.name) {
            // Never downloaded: due immediately
            None => Some(DateTime::<Utc>::MIN_UTC),
            // A deadline past the calendar never comes
            Some(written) => alias.ttl.and_then(|ttl| written.checked_add_signed(ttl)),
        }
    }
}

/// Parse a downloaded list: one entry per line, `#` and `;` start comments,
/// anything after the first whitespace is ignored.
pub fn parse_url_list(body: &str) -> ResolvedContent {
    let mut skipped = 0usize;
    let content = body
        .lines()
        .filter_map(|line| {
            let line = line.split(['#', ';']).next().unwrap_or("");
            let token = line.split_whitespace().next()?;
            match normalize_address(token) {
                Ok(entry) => Some(entry),
                Err(_) => {
                    skipped += 1;
                    None
                }
            }
        })
        .collect();
    if skipped > 0 {
        debug!("Skipped {} unparsable lines", skipped);
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasKind;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn strategy(dir: &TempDir) -> UrlStrategy {
        UrlStrategy::new(&FetchConfig::default(), SnapshotStore::new(dir.path())).unwrap()
    }

    #[test]
    fn test_parse_url_list() {
        let body = "# Spamhaus DROP\n\
                    1.10.16.0/20 ; SBL256894\n\
                    \n\
                    2.56.192.0/22 ; SBL459831\n\
                    10.0.0.1   some comment\n\
                    garbage line\n\
                    ; trailing comment\n";
        let content = parse_url_list(body);
        assert_eq!(content.len(), 3);
        assert!(content.contains("1.10.16.0/20"));
        assert!(content.contains("2.56.192.0/22"));
        assert!(content.contains("10.0.0.1"));
    }

    #[test]
    fn test_parse_url_list_dedup() {
        let content = parse_url_list("10.0.0.1\n10.0.0.1\n10.0.0.1/32\n");
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn test_cache_expires_without_download() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let alias = AliasDefinition::new("feed", AliasKind::UrlTable);
        assert_eq!(
            strategy(&dir).cache_expires_at(&alias, &store),
            Some(DateTime::<Utc>::MIN_UTC)
        );
    }

    #[test]
    fn test_cache_expiry_follows_ttl() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .write_cache("feed", &["10.0.0.1"].into_iter().collect())
            .unwrap();
        let written = store.cache_modified("feed").unwrap();

        let mut alias = AliasDefinition::new("feed", AliasKind::UrlTable);
        alias.ttl = Some(ChronoDuration::hours(1));
        assert_eq!(
            strategy(&dir).cache_expires_at(&alias, &store),
            Some(written + ChronoDuration::hours(1))
        );

        // `url` aliases without ttl keep their download
        alias.ttl = None;
        assert_eq!(strategy(&dir).cache_expires_at(&alias, &store), None);
    }

    #[test]
    fn test_cache_expiry_beyond_calendar() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .write_cache("feed", &["10.0.0.1"].into_iter().collect())
            .unwrap();

        let mut alias = AliasDefinition::new("feed", AliasKind::UrlTable);
        alias.ttl = Some(ChronoDuration::days(100_000_000));
        assert_eq!(strategy(&dir).cache_expires_at(&alias, &store), None);
    }

    #[tokio::test]
    async fn test_resolve_uses_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let strategy = strategy(&dir);
        strategy
            .store
            .write_cache("feed", &["10.0.0.1", "10.0.0.2"].into_iter().collect())
            .unwrap();

        let mut alias = AliasDefinition::new("feed", AliasKind::Url)
            .changed_at(Utc::now() - ChronoDuration::hours(1));
        // Unreachable on purpose: a fetch attempt would fail the test
        alias.urls = vec!["http://127.0.0.1:9/list.txt".to_string()];

        let content = strategy.resolve(&alias).await.unwrap();
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn test_fresh_cache_rejected_after_definition_change() {
        let dir = TempDir::new().unwrap();
        let strategy = strategy(&dir);
        strategy
            .store
            .write_cache("feed", &["10.0.0.1"].into_iter().collect())
            .unwrap();
        let now = Utc::now();

        let alias = AliasDefinition::new("feed", AliasKind::Url)
            .changed_at(now + ChronoDuration::minutes(1));
        assert!(strategy.fresh_cache(&alias, now).is_none());

        let mut alias = AliasDefinition::new("feed", AliasKind::UrlTable)
            .changed_at(now - ChronoDuration::hours(1));
        alias.cache_expires_at = Some(now - ChronoDuration::seconds(1));
        assert!(strategy.fresh_cache(&alias, now).is_none());

        alias.cache_expires_at = Some(now + ChronoDuration::hours(1));
        assert!(strategy.fresh_cache(&alias, now).is_some());
    }

    #[tokio::test]
    async fn test_resolve_unreachable_fails() {
        let dir = TempDir::new().unwrap();
        let fetch = FetchConfig {
            timeout_secs: 1,
            max_retries: 1,
            max_size: 1024,
        };
        let strategy = UrlStrategy::new(&fetch, SnapshotStore::new(dir.path())).unwrap();
        let mut alias = AliasDefinition::new("feed", AliasKind::UrlTable);
        alias.urls = vec!["http://127.0.0.1:9/list.txt".to_string()];

        let result = strategy.resolve(&alias).await;
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to fetch"));
    }
}
