//! Update command implementation.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info};

use crate::alias::{load_definitions, AliasGraph};
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::enforcer::create_backend;
use crate::error::SyncError;
use crate::lock::LockGuard;
use crate::snapshot::SnapshotStore;
use crate::strategy::StrategyRegistry;
use crate::sync::{RunReport, RunResult, SyncEngine};
use crate::utils::{format_count, format_names};

const MAX_LOGGED_TARGETS: usize = 10;

/// Run the update command
pub async fn run(aliases: Option<Vec<String>>, output: OutputFormat, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path).map_err(|e| {
        let fatal = SyncError::ConfigurationFatal(format!("{:#}", e));
        error!("{}", fatal);
        fatal
    })?;

    let _lock = LockGuard::acquire(&config.lock_file)?;

    let store = SnapshotStore::new(&config.snapshot_dir);
    store.ensure_dir()?;

    let registry = StrategyRegistry::standard(&config, &store)?;
    let graph = AliasGraph::new(load_definitions(&config, &registry, &store, Utc::now()));
    let backend = create_backend(config.backend)?;

    let targets = aliases.map(parse_targets);
    match &targets {
        Some(targets) => {
            let names: Vec<&String> = targets.iter().collect();
            info!(
                "Updating {} ({} backend)",
                format_names(&names, MAX_LOGGED_TARGETS),
                backend.name()
            )
        }
        None => info!("Updating {} aliases ({} backend)", graph.len(), backend.name()),
    }

    let report = SyncEngine::new(&graph, &registry, &store, backend.as_ref())
        .run(targets.as_ref())
        .await;
    let result = report.result();

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string(&result).context("Failed to serialize run result")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", render_text(&report, &result)),
    }

    Ok(())
}

fn parse_targets(names: Vec<String>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Human readable run summary
fn render_text(report: &RunReport, result: &RunResult) -> String {
    let mut out = String::new();
    let changed: Vec<_> = report
        .decisions
        .iter()
        .filter(|(_, decision)| !decision.is_noop())
        .collect();

    out.push_str(&format!(
        "{} aliases checked, {} updated, {} removed\n",
        report.decisions.len(),
        changed.len(),
        report.removed.len()
    ));
    for (name, decision) in changed {
        out.push_str(&format!(
            "  {}: {} ({} entries)\n",
            name,
            decision.reason,
            format_count(decision.new_size)
        ));
    }
    for name in &report.removed {
        out.push_str(&format!("  {}: removed\n", name));
    }
    for message in &result.messages {
        out.push_str(&format!("error: {}\n", message));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{LiveAction, SyncDecision, SyncReason};

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets(vec![" lan".to_string(), String::new(), "dmz".to_string()]);
        assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec!["dmz", "lan"]);
    }

    #[test]
    fn test_render_text() {
        let report = RunReport {
            decisions: vec![
                (
                    "lan".to_string(),
                    SyncDecision {
                        rewrite_snapshot: true,
                        reload: LiveAction::Replace,
                        reason: SyncReason::DefinitionChanged,
                        current_size: 0,
                        new_size: 1500,
                    },
                ),
                (
                    "dmz".to_string(),
                    SyncDecision {
                        rewrite_snapshot: false,
                        reload: LiveAction::Noop,
                        reason: SyncReason::Unchanged,
                        current_size: 2,
                        new_size: 2,
                    },
                ),
            ],
            errors: vec![SyncError::ResolveFailed {
                alias: "feed".to_string(),
                message: "timeout".to_string(),
            }],
            removed: vec!["old".to_string()],
        };

        let text = render_text(&report, &report.result());
        assert!(text.starts_with("2 aliases checked, 1 updated, 1 removed\n"));
        assert!(text.contains("  lan: definition changed (1.5K entries)\n"));
        assert!(!text.contains("dmz"));
        assert!(text.contains("  old: removed\n"));
        assert!(text.contains("error: Error resolving alias [feed]: timeout\n"));
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let err = run(None, OutputFormat::Json, Path::new("/nonexistent/filter_tables.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::ConfigurationFatal(_))
        ));
    }
}
