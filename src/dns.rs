//! DNS resolution for host names listed in static aliases.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

/// Default DNS resolution timeout in seconds
const DNS_TIMEOUT_SECS: u64 = 5;

/// Outcome of a forward lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Resolved(BTreeSet<IpAddr>),
    NotFound,
    TimedOut,
}

/// Resolve a host name to all its addresses (A and AAAA) with a timeout.
pub async fn resolve_host(name: &str) -> Lookup {
    resolve_host_with_timeout(name, Duration::from_secs(DNS_TIMEOUT_SECS)).await
}

pub async fn resolve_host_with_timeout(name: &str, timeout: Duration) -> Lookup {
    let lookup = tokio::net::lookup_host((name, 0u16));

    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(addrs)) => {
            let ips: BTreeSet<IpAddr> = addrs.map(|sa| sa.ip()).collect();
            if ips.is_empty() {
                Lookup::NotFound
            } else {
                Lookup::Resolved(ips)
            }
        }
        Ok(Err(_)) => Lookup::NotFound,
        Err(_) => Lookup::TimedOut,
    }
}
