//! Configuration management for tablesync.
//!
//! The YAML file carries the engine settings and the ordered alias definitions.
//! Anything that fails here is fatal for the run: without definitions there is
//! nothing safe to synchronize.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::alias::{AliasKind, Proto};
use crate::validation::{parse_interval, validate_alias_name, validate_source_url};

pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/filter_tables.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding snapshots, ownership markers and download caches
    pub snapshot_dir: PathBuf,

    /// Live table backend (auto, pf, nftables)
    pub backend: Backend,

    /// Directory with per-country address files (`NL-IPv4`, `NL-IPv6`, ...)
    pub geoip_dir: PathBuf,

    /// Lock file serializing full runs
    pub lock_file: PathBuf,

    /// Download settings for URL aliases
    pub fetch: FetchConfig,

    /// Alias definitions, in source order
    pub aliases: Vec<AliasConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("/var/db/aliastables"),
            backend: Backend::Auto,
            geoip_dir: PathBuf::from("/usr/local/share/GeoIP/alias"),
            lock_file: PathBuf::from("/var/run/filter_tables.lock"),
            fetch: FetchConfig::default(),
            aliases: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config file: {:?}", path.as_ref()))
    }

    /// Parse and validate configuration text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for alias in &self.aliases {
            validate_alias_name(&alias.name)?;
            if !seen.insert(alias.name.as_str()) {
                anyhow::bail!("Duplicate alias name '{}'", alias.name);
            }
            if let Some(ref ttl) = alias.ttl {
                parse_interval(ttl).with_context(|| format!("Alias '{}'", alias.name))?;
            }
            for url in &alias.urls {
                validate_source_url(url).with_context(|| format!("Alias '{}'", alias.name))?;
            }
        }

        if self.fetch.max_retries == 0 {
            anyhow::bail!("fetch.max_retries must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Enabled aliases in source order
    pub fn enabled_aliases(&self) -> impl Iterator<Item = &AliasConfig> {
        self.aliases.iter().filter(|a| a.enabled)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Use pf when pfctl is installed, nftables otherwise
    #[default]
    Auto,
    /// pfctl tables
    Pf,
    /// nftables named sets
    Nftables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per request timeout
    pub timeout_secs: u64,
    /// Attempts per URL (first try included)
    pub max_retries: u32,
    /// Maximum size of a single download in bytes
    pub max_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            max_size: 32 * 1024 * 1024,
        }
    }
}

/// One alias as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AliasKind,
    /// Addresses, networks, host names, country codes or nested alias names
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Refresh interval for `urltable` aliases (`1d`, `4h`, ...)
    #[serde(default)]
    pub ttl: Option<String>,
    /// Address families for `geoip` aliases, both when empty
    #[serde(default)]
    pub proto: Vec<Proto>,
    #[serde(default = "default_true")]
    pub managed: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl AliasConfig {
    /// SHA-256 over the serialized definition.
    ///
    /// Any edit of the alias (content, urls, ttl, ...) produces a new digest.
    pub fn digest(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }
}
