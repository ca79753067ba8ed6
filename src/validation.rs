//! Centralized validation functions for tablesync.
//!
//! This module provides unified validation for:
//! - Alias names (they double as file names and packet-filter table names)
//! - IP addresses and CIDR ranges found in alias content
//! - Host names that still need resolving
//! - Refresh intervals (`ttl`) and source URLs

use anyhow::{bail, Result};
use chrono::Duration;
use ipnet::IpNet;
use std::net::IpAddr;

/// Longest table name accepted by the packet filter.
pub const MAX_ALIAS_NAME_LEN: usize = 31;

/// Check an alias name: `[A-Za-z_][A-Za-z0-9_]{0,30}`.
///
/// Names never contain a dot, so the snapshot directory can recover the
/// alias a file belongs to from everything before the first `.`.
///
/// # Examples
/// ```
/// use tablesync::validation::is_valid_alias_name;
/// assert!(is_valid_alias_name("bogons_v6"));
/// assert!(!is_valid_alias_name("1st"));
/// assert!(!is_valid_alias_name("a.b"));
/// ```
pub fn is_valid_alias_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_ALIAS_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate an alias name with a descriptive error.
pub fn validate_alias_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Alias name cannot be empty");
    }
    if !is_valid_alias_name(name) {
        bail!(
            "Invalid alias name '{}'. Use letters, digits and '_' (max {} characters, not starting with a digit)",
            name,
            MAX_ALIAS_NAME_LEN
        );
    }
    Ok(())
}

/// Normalize an address or network to the text stored in a table.
///
/// Plain addresses stay plain (`10.0.0.1`), networks are truncated to their
/// prefix (`10.1.2.3/8` becomes `10.0.0.0/8`).
///
/// # Examples
/// ```
/// use tablesync::validation::normalize_address;
/// assert_eq!(normalize_address("10.1.2.3/8").unwrap(), "10.0.0.0/8");
/// assert_eq!(normalize_address(" ::1 ").unwrap(), "::1");
/// assert!(normalize_address("example.com").is_err());
/// ```
pub fn normalize_address(item: &str) -> Result<String> {
    let item = item.trim();
    if item.contains('/') {
        let net: IpNet = item
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", item))?;
        Ok(net.trunc().to_string())
    } else {
        let ip: IpAddr = item
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", item))?;
        Ok(ip.to_string())
    }
}

/// Check whether a string is a syntactically valid DNS host name (RFC 1123).
///
/// # Examples
/// ```
/// use tablesync::validation::is_valid_hostname;
/// assert!(is_valid_hostname("mirror.example.org"));
/// assert!(!is_valid_hostname("-bad.example"));
/// ```
pub fn is_valid_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Longest accepted refresh interval
const MAX_INTERVAL_DAYS: i64 = 3650;

/// Parse a refresh interval such as `30m`, `4h` or `1d`, at most ten years.
///
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use tablesync::validation::parse_interval;
/// assert_eq!(parse_interval("2h").unwrap().num_seconds(), 7200);
/// assert!(parse_interval("4x").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if !interval.is_ascii() || interval.len() < 2 {
        bail!(
            "Invalid interval '{}'. Use format like '4h', '30m', '1d'",
            interval
        );
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);
    let value: u32 = num_part.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid interval '{}'. Number part must be a positive integer",
            interval
        )
    })?;
    let value = i64::from(value);

    let duration = match suffix {
        "s" => Duration::seconds(value),
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        _ => bail!(
            "Invalid interval '{}'. Suffix must be s, m, h, or d",
            interval
        ),
    };
    if duration > Duration::days(MAX_INTERVAL_DAYS) {
        bail!(
            "Invalid interval '{}'. Must not exceed {} days",
            interval,
            MAX_INTERVAL_DAYS
        );
    }
    Ok(duration)
}

/// Only plain HTTP(S) sources can be fetched.
pub fn validate_source_url(url: &str) -> Result<()> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!("Source URL must use http or https: {}", url);
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("Source URL contains whitespace or control characters: {}", url);
    }
    Ok(())
}
