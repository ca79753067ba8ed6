//! Error types for tablesync.

use thiserror::Error;

/// Errors produced by a synchronization pass.
///
/// Only [`SyncError::ConfigurationFatal`] aborts a run. Every other variant is
/// scoped to a single alias: it is recorded in the run result and the alias keeps
/// its previous snapshot and live table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("filter table configuration error: {0}")]
    ConfigurationFatal(String),

    #[error("Error resolving alias [{alias}]: {message}")]
    ResolveFailed { alias: String, message: String },

    #[error("Error loading alias [{alias}]: {message} {{current_size: {current_size}, new_size: {new_size}}}")]
    BackendRejected {
        alias: String,
        message: String,
        current_size: usize,
        new_size: usize,
    },

    #[error("Error writing alias [{alias}]: {message}")]
    IoFailure { alias: String, message: String },
}

impl SyncError {
    /// Name of the alias this error belongs to, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            SyncError::ConfigurationFatal(_) => None,
            SyncError::ResolveFailed { alias, .. }
            | SyncError::BackendRejected { alias, .. }
            | SyncError::IoFailure { alias, .. } => Some(alias),
        }
    }
}
