//! # tablesync - alias table synchronization for packet-filter gateways
//!
//! Turns declarative alias definitions (host lists, networks, URL tables, GeoIP
//! regions, nested groups) into packet-filter tables, keeping an on-disk
//! snapshot and the live table of every alias consistent with its definition.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        tablesync                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: update, version                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml) ──► AliasDefinition ──► AliasGraph     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Strategies (StrategyRegistry)                              │
//! │    ├── StaticStrategy (host, network, networkgroup)         │
//! │    ├── UrlStrategy (reqwest + rustls, download cache)       │
//! │    └── GeoIpStrategy (per-country files)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sync engine                                                │
//! │    ├── ContentResolver  (own content, one-level merge)      │
//! │    ├── plan()           (rewrite / flush / replace)         │
//! │    ├── TableSynchronizer                                    │
//! │    └── StaleAliasReaper (full runs only)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SnapshotStore (atomic writes, ownership markers)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (TableBackend trait)                              │
//! │    ├── PfBackend (pfctl tables)                             │
//! │    └── NftablesBackend (inet sets)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use tablesync::alias::{load_definitions, AliasGraph};
//! use tablesync::config::Config;
//! use tablesync::enforcer::create_backend;
//! use tablesync::snapshot::SnapshotStore;
//! use tablesync::strategy::StrategyRegistry;
//! use tablesync::sync::SyncEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/usr/local/etc/filter_tables.yaml")?;
//!     let store = SnapshotStore::new(&config.snapshot_dir);
//!     store.ensure_dir()?;
//!
//!     let registry = StrategyRegistry::standard(&config, &store)?;
//!     let graph = AliasGraph::new(load_definitions(&config, &registry, &store, Utc::now()));
//!     let backend = create_backend(config.backend)?;
//!
//!     let report = SyncEngine::new(&graph, &registry, &store, backend.as_ref())
//!         .run(None)
//!         .await;
//!     println!("{}", serde_json::to_string(&report.result())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`alias`] - Alias definitions, resolved content and the dependency graph
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Mockable execution of `pfctl` / `nft`
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`dns`] - DNS resolution with timeout
//! - [`enforcer`] - Live table backends (pf, nftables)
//! - [`error`] - Run error taxonomy
//! - [`lock`] - File locking serializing runs
//! - [`snapshot`] - Snapshot directory (snapshots, markers, caches)
//! - [`strategy`] - Content strategies and their registry
//! - [`sync`] - The synchronization pass
//! - [`utils`] - Formatting helpers
//! - [`validation`] - Input validation (names, addresses, intervals, URLs)

pub mod alias;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dns;
pub mod enforcer;
pub mod error;
pub mod lock;
pub mod snapshot;
pub mod strategy;
pub mod sync;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::SyncError;
