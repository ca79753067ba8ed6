//! Static host and network lists.

use anyhow::Result;
use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Subnets, Ipv6Subnets};
use std::net::IpAddr;
use tracing::{debug, warn};

use super::ContentStrategy;
use crate::alias::{AliasDefinition, ResolvedContent};
use crate::dns::{resolve_host, Lookup};
use crate::validation::{is_valid_hostname, normalize_address};

/// One literal item of a static alias.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Entries(Vec<String>),
    Hostname(String),
    Invalid,
}

/// Literal addresses, networks, ranges and host names.
///
/// Host names are resolved on every fresh resolve; names that do not resolve
/// are dropped with a warning instead of failing the alias.
#[derive(Debug, Default)]
pub struct StaticStrategy;

impl StaticStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentStrategy for StaticStrategy {
    async fn resolve(&self, alias: &AliasDefinition) -> Result<ResolvedContent> {
        let mut content = ResolvedContent::new();
        let mut hostnames = Vec::new();

        for raw in &alias.items {
            match classify(raw) {
                Item::Entries(entries) => entries.into_iter().for_each(|e| {
                    content.insert(e);
                }),
                Item::Hostname(name) => hostnames.push(name),
                Item::Invalid => warn!("Alias {}: skipping invalid entry '{}'", alias.name, raw),
            }
        }

        for name in hostnames {
            match resolve_host(&name).await {
                Lookup::Resolved(ips) => {
                    debug!("Alias {}: {} -> {} addresses", alias.name, name, ips.len());
                    for ip in ips {
                        content.insert(ip.to_string());
                    }
                }
                Lookup::NotFound => warn!("Alias {}: cannot resolve {}", alias.name, name),
                Lookup::TimedOut => warn!("Alias {}: DNS timeout for {}", alias.name, name),
            }
        }

        Ok(content)
    }
}

fn classify(raw: &str) -> Item {
    let item = raw.trim();
    if item.is_empty() {
        return Item::Invalid;
    }
    if let Ok(entry) = normalize_address(item) {
        return Item::Entries(vec![entry]);
    }
    if let Some(entries) = expand_range(item) {
        return Item::Entries(entries);
    }
    if is_valid_hostname(item) {
        return Item::Hostname(item.to_string());
    }
    Item::Invalid
}

/// Expand `first-last` into the smallest covering list of networks.
fn expand_range(item: &str) -> Option<Vec<String>> {
    let (start, end) = item.split_once('-')?;
    let start: IpAddr = start.trim().parse().ok()?;
    let end: IpAddr = end.trim().parse().ok()?;

    let nets: Vec<IpNet> = match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) if s <= e => {
            Ipv4Subnets::new(s, e, 0).map(IpNet::V4).collect()
        }
        (IpAddr::V6(s), IpAddr::V6(e)) if s <= e => {
            Ipv6Subnets::new(s, e, 0).map(IpNet::V6).collect()
        }
        _ => return None,
    };

    Some(
        nets.into_iter()
            .map(|net| {
                if net.prefix_len() == net.max_prefix_len() {
                    net.addr().to_string()
                } else {
                    net.to_string()
                }
            })
            .collect(),
    )
}
