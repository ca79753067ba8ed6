//! Live table backends (pf, nftables).

mod nftables;
mod pf;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::process::Command;

pub use nftables::NftablesBackend;
pub use pf::PfBackend;

use crate::alias::ResolvedContent;
use crate::config::Backend;

pub(crate) const PFCTL_PATH: &str = "/sbin/pfctl";
pub(crate) const NFT_PATH: &str = "/usr/sbin/nft";

/// Packet-filter side of an alias: a named table of addresses.
///
/// Mutating calls return the tool's diagnostic output. A rejected operation is
/// recognized by [`TableBackend::rejection_prefix`] in that output; `Err` is
/// reserved for failures to talk to the tool at all.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Prefix the tool puts in front of error messages
    fn rejection_prefix(&self) -> &'static str;

    /// Number of entries currently loaded; a missing table has none
    async fn current_size(&self, table: &str) -> Result<usize>;

    /// Number of entries the table holds once `content` is loaded
    fn loaded_size(&self, content: &ResolvedContent) -> usize {
        content.len()
    }

    /// Remove all entries, keeping the table
    async fn flush(&self, table: &str) -> Result<String>;

    /// Replace the table contents with the entries of `snapshot`
    async fn replace(&self, table: &str, snapshot: &Path) -> Result<String>;

    /// Drop the table altogether
    async fn remove(&self, table: &str) -> Result<String>;
}

/// Extract the rejection message from tool output, if the output carries one.
///
/// The prefix is stripped so messages read `Table does not exist.` rather
/// than `pfctl: Table does not exist.`.
pub fn rejection_message(output: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() || !output.contains(prefix) {
        return None;
    }
    Some(output.replace(prefix, "").trim().to_string())
}

/// Detect the available backend
pub fn detect_backend() -> Result<Backend> {
    if Path::new(PFCTL_PATH).exists() {
        return Ok(Backend::Pf);
    }

    if Command::new(NFT_PATH).arg("--version").output().is_ok() {
        return Ok(Backend::Nftables);
    }

    anyhow::bail!("No packet filter available (pfctl or nft required)")
}

/// Create a backend based on configuration
pub fn create_backend(backend: Backend) -> Result<Box<dyn TableBackend>> {
    let actual = match backend {
        Backend::Auto => detect_backend()?,
        other => other,
    };

    match actual {
        Backend::Pf => Ok(Box::new(PfBackend::new())),
        Backend::Nftables => Ok(Box::new(NftablesBackend::new())),
        Backend::Auto => anyhow::bail!("Backend detection returned auto"),
    }
}
