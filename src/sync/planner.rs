//! Per-alias sync decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::resolver::Resolution;

/// What happens to the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveAction {
    Noop,
    /// Content is empty but the table still holds entries
    FlushEmpty,
    /// Load the snapshot into the table
    Replace,
}

/// Why an alias is (or is not) being synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    Unchanged,
    DefinitionChanged,
    CacheExpired,
    DependencyChanged,
    SizeMismatch,
    MissingSnapshot,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyncReason::Unchanged => "unchanged",
            SyncReason::DefinitionChanged => "definition changed",
            SyncReason::CacheExpired => "cache expired",
            SyncReason::DependencyChanged => "dependency changed",
            SyncReason::SizeMismatch => "size mismatch",
            SyncReason::MissingSnapshot => "missing snapshot",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    pub rewrite_snapshot: bool,
    pub reload: LiveAction,
    pub reason: SyncReason,
    /// Live entry count the decision was based on
    pub current_size: usize,
    pub new_size: usize,
}

impl SyncDecision {
    pub fn is_noop(&self) -> bool {
        !self.rewrite_snapshot && self.reload == LiveAction::Noop
    }
}

/// Decide what to do with one alias.
///
/// `snapshot_written` is when the alias's snapshot last caught up with its
/// sources, `current_size` the live table's entry count (or, on targeted runs,
/// `loaded_size`) and `loaded_size` the count the table reports once the new
/// content is loaded.
pub fn plan(
    resolution: &Resolution,
    snapshot_written: Option<DateTime<Utc>>,
    current_size: usize,
    loaded_size: usize,
) -> SyncDecision {
    let new_size = resolution.content.len();

    let stale_reason = match snapshot_written {
        None => Some(SyncReason::MissingSnapshot),
        Some(written) if resolution.own_watermark() > written => {
            if resolution.expired.is_some_and(|at| at > written && at >= resolution.changed_at) {
                Some(SyncReason::CacheExpired)
            } else {
                Some(SyncReason::DefinitionChanged)
            }
        }
        Some(written) if resolution.watermark() > written => Some(SyncReason::DependencyChanged),
        Some(_) => None,
    };
    let stale = stale_reason.is_some();

    let reload = if new_size == 0 {
        if current_size > 0 {
            LiveAction::FlushEmpty
        } else {
            LiveAction::Noop
        }
    } else if loaded_size != current_size || stale {
        LiveAction::Replace
    } else {
        LiveAction::Noop
    };

    let reason = match stale_reason {
        Some(reason) => reason,
        None if reload != LiveAction::Noop => SyncReason::SizeMismatch,
        None => SyncReason::Unchanged,
    };

    SyncDecision {
        rewrite_snapshot: stale,
        reload,
        reason,
        current_size,
        new_size,
    }
}
