//! Formatting helpers for logs and text output.

/// Compact entry count.
///
/// # Examples
/// ```
/// use tablesync::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    match count {
        0..=999 => count.to_string(),
        1_000..=999_999 => format!("{:.1}K", count as f64 / 1e3),
        _ => format!("{:.1}M", count as f64 / 1e6),
    }
}

/// Comma separated names, cut after `max` with a `+N more` suffix.
///
/// # Examples
/// ```
/// use tablesync::utils::format_names;
/// assert_eq!(format_names(&["lan", "dmz"], 5), "lan, dmz");
/// assert_eq!(format_names(&["a", "b", "c"], 2), "a, b (+1 more)");
/// ```
pub fn format_names<S: AsRef<str>>(names: &[S], max: usize) -> String {
    let shown: Vec<&str> = names.iter().take(max).map(AsRef::as_ref).collect();
    let mut out = shown.join(", ");
    if names.len() > max {
        out.push_str(&format!(" (+{} more)", names.len() - max));
    }
    out
}
