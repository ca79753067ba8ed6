//! nftables backend implementation.
//!
//! Each alias maps to two interval sets in `table inet aliastables`: `NAME`
//! for IPv4 entries and `NAME_v6` for IPv6 entries. Scripts are fed to
//! `nft -f -` so every change is applied as one transaction.
//!
//! Interval sets reject overlapping elements, so entries are aggregated
//! before loading and sizes are counted after aggregation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, warn};

use super::{TableBackend, NFT_PATH};
use crate::alias::ResolvedContent;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput, RealCommandExecutor};

const TABLE_FAMILY: &str = "inet";
const TABLE_NAME: &str = "aliastables";
const REJECTION_PREFIX: &str = "Error: ";

/// Validate that an IP/CIDR string is safe for nftables script inclusion.
fn is_safe_nft_element(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c))
}

fn v6_set(table: &str) -> String {
    format!("{}_v6", table)
}

fn parse_entry(entry: &str) -> Option<IpNet> {
    entry
        .parse::<IpNet>()
        .ok()
        .or_else(|| entry.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Merge overlapping and adjacent networks, per family.
///
/// For example: [10.0.0.0/8, 10.1.0.0/16] -> [10.0.0.0/8]
fn aggregate(nets: &[IpNet]) -> Vec<IpNet> {
    let mut v4: Vec<Ipv4Net> = Vec::new();
    let mut v6: Vec<Ipv6Net> = Vec::new();
    for net in nets {
        match net {
            IpNet::V4(net) => v4.push(*net),
            IpNet::V6(net) => v6.push(*net),
        }
    }

    Ipv4Net::aggregate(&v4)
        .into_iter()
        .map(IpNet::V4)
        .chain(Ipv6Net::aggregate(&v6).into_iter().map(IpNet::V6))
        .collect()
}

/// nftables backend
pub struct NftablesBackend<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
}

impl NftablesBackend<RealCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealCommandExecutor::new())
    }
}

impl Default for NftablesBackend<RealCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> NftablesBackend<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    fn exec_script(&self, script: &str) -> Result<CommandOutput> {
        debug!("nft script:\n{}", script);
        self.executor
            .execute_with_stdin(NFT_PATH, &args_to_strings(&["-f", "-"]), script)
    }

    /// Element count of one set; `None` when the set does not exist
    fn set_size(&self, set: &str) -> Result<Option<usize>> {
        let output = self.executor.execute(
            NFT_PATH,
            &args_to_strings(&["list", "set", TABLE_FAMILY, TABLE_NAME, set]),
        )?;
        if !output.success {
            return Ok(None);
        }
        Ok(Some(count_set_elements(&output.stdout)))
    }

    /// Generate the script loading `entries` into the alias's sets
    fn generate_replace_script(&self, table: &str, entries: &[IpNet]) -> String {
        let v6 = v6_set(table);
        let mut script = String::new();

        script.push_str(&format!("add table {} {}\n", TABLE_FAMILY, TABLE_NAME));
        script.push_str(&format!(
            "add set {} {} {} {{ type ipv4_addr; flags interval; }}\n",
            TABLE_FAMILY, TABLE_NAME, table
        ));
        script.push_str(&format!(
            "add set {} {} {} {{ type ipv6_addr; flags interval; }}\n",
            TABLE_FAMILY, TABLE_NAME, v6
        ));
        script.push_str(&format!("flush set {} {} {}\n", TABLE_FAMILY, TABLE_NAME, table));
        script.push_str(&format!("flush set {} {} {}\n", TABLE_FAMILY, TABLE_NAME, v6));

        let aggregated = aggregate(entries);
        if aggregated.len() < entries.len() {
            debug!(
                "Alias {}: aggregated {} entries into {} ranges",
                table,
                entries.len(),
                aggregated.len()
            );
        }
        let (v4, v6_entries): (Vec<&IpNet>, Vec<&IpNet>) =
            aggregated.iter().partition(|net| matches!(net, IpNet::V4(_)));

        for (set, nets) in [(table, v4), (v6.as_str(), v6_entries)] {
            let elements: Vec<String> = nets
                .iter()
                .map(|net| render_element(net))
                .filter(|s| {
                    let safe = is_safe_nft_element(s);
                    if !safe {
                        warn!("Filtered unsafe nftables element: {}", s);
                    }
                    safe
                })
                .collect();
            if elements.is_empty() {
                continue;
            }
            script.push_str(&format!(
                "add element {} {} {} {{ {} }}\n",
                TABLE_FAMILY,
                TABLE_NAME,
                set,
                elements.join(", ")
            ));
        }

        script
    }
}

/// Host networks are written as plain addresses.
fn render_element(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

fn script_diagnostics(output: CommandOutput) -> String {
    if output.success {
        String::new()
    } else {
        output.diagnostics()
    }
}

#[async_trait]
impl<E: CommandExecutor> TableBackend for NftablesBackend<E> {
    fn name(&self) -> &'static str {
        "nftables"
    }

    fn rejection_prefix(&self) -> &'static str {
        REJECTION_PREFIX
    }

    async fn current_size(&self, table: &str) -> Result<usize> {
        let v4 = self.set_size(table)?.unwrap_or(0);
        let v6 = self.set_size(&v6_set(table))?.unwrap_or(0);
        Ok(v4 + v6)
    }

    fn loaded_size(&self, content: &ResolvedContent) -> usize {
        let entries: Vec<IpNet> = content.iter().filter_map(|entry| parse_entry(entry)).collect();
        aggregate(&entries).len()
    }

    async fn flush(&self, table: &str) -> Result<String> {
        let mut script = String::new();
        for set in [table.to_string(), v6_set(table)] {
            if self.set_size(&set)?.is_some() {
                script.push_str(&format!("flush set {} {} {}\n", TABLE_FAMILY, TABLE_NAME, set));
            }
        }
        if script.is_empty() {
            return Ok(String::new());
        }
        Ok(script_diagnostics(self.exec_script(&script)?))
    }

    async fn replace(&self, table: &str, snapshot: &Path) -> Result<String> {
        let text = std::fs::read_to_string(snapshot)
            .with_context(|| format!("Failed to read {}", snapshot.display()))?;

        let mut entries = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match parse_entry(line) {
                Some(net) => entries.push(net),
                None => warn!("Alias {}: nftables sets hold addresses only, skipping '{}'", table, line),
            }
        }

        let script = self.generate_replace_script(table, &entries);
        Ok(script_diagnostics(self.exec_script(&script)?))
    }

    async fn remove(&self, table: &str) -> Result<String> {
        let mut script = String::new();
        for set in [table.to_string(), v6_set(table)] {
            if self.set_size(&set)?.is_some() {
                script.push_str(&format!("delete set {} {} {}\n", TABLE_FAMILY, TABLE_NAME, set));
            }
        }
        if script.is_empty() {
            return Ok(String::new());
        }
        Ok(script_diagnostics(self.exec_script(&script)?))
    }
}

/// Count elements in `nft list set` output.
///
/// Large sets wrap the element list over several lines.
fn count_set_elements(output: &str) -> usize {
    let Some(start) = output.find("elements = {") else {
        return 0;
    };
    let rest = &output[start + "elements = {".len()..];
    let body = rest.split('}').next().unwrap_or("");
    body.split(',').filter(|s| !s.trim().is_empty()).count()
}
