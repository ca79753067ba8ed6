//! On-disk alias state: snapshots, ownership markers and download caches.
//!
//! Every file in the snapshot directory is named `<alias>.<suffix>`:
//!
//! - `<alias>.txt` - resolved content, sorted, one entry per line
//! - `<alias>.marker.json` - ownership marker written alongside the snapshot of a
//!   managed alias
//! - `<alias>.state.json` - the same record for aliases that are not managed;
//!   it never proves ownership
//! - `<alias>.cache.txt` - last download of a URL alias
//!
//! Markers and state files hold an [`AliasState`]: the definition digest, its
//! change time and the watermark the snapshot was last brought up to.
//!
//! All writes go through a temporary file in the same directory followed by an
//! atomic rename, so readers never observe a half-written file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::alias::ResolvedContent;
use crate::validation::is_valid_alias_name;

const SNAPSHOT_SUFFIX: &str = "txt";
const MARKER_SUFFIX: &str = "marker.json";
const STATE_SUFFIX: &str = "state.json";
const CACHE_SUFFIX: &str = "cache.txt";

/// Definition record kept next to an alias's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasState {
    pub digest: String,
    pub changed_at: DateTime<Utc>,
    /// Watermark the snapshot reflected when it was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<DateTime<Utc>>,
}

impl AliasState {
    pub fn new(digest: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
        Self {
            digest: digest.into(),
            changed_at,
            applied: None,
        }
    }
}

/// Files found on disk for one alias name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredAlias {
    pub files: Vec<PathBuf>,
    pub has_snapshot: bool,
    pub has_marker: bool,
}

/// Snapshot directory handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the snapshot directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, SNAPSHOT_SUFFIX))
    }

    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, MARKER_SUFFIX))
    }

    pub fn state_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, STATE_SUFFIX))
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, CACHE_SUFFIX))
    }

    /// Last persisted content, empty when there is none.
    pub fn read_snapshot(&self, name: &str) -> ResolvedContent {
        read_content(&self.snapshot_path(name))
    }

    pub fn snapshot_modified(&self, name: &str) -> Option<DateTime<Utc>> {
        modified(&self.snapshot_path(name))
    }

    /// When the snapshot last caught up with its sources.
    ///
    /// The file's modification time, or the watermark recorded for `digest`
    /// when that is later. File times come from a coarse clock and can trail
    /// the timestamps they are compared with.
    pub fn snapshot_written(&self, name: &str, digest: &str) -> Option<DateTime<Utc>> {
        let modified = self.snapshot_modified(name)?;
        let applied = self.read_state(name, digest).and_then(|state| state.applied);
        Some(applied.map_or(modified, |at| at.max(modified)))
    }

    pub fn write_snapshot(&self, name: &str, content: &ResolvedContent) -> Result<()> {
        self.write_atomic(&self.snapshot_path(name), content.to_snapshot_text().as_bytes())
    }

    pub fn read_marker(&self, name: &str) -> Option<AliasState> {
        read_record(&self.marker_path(name))
    }

    pub fn write_marker(&self, name: &str, marker: &AliasState) -> Result<()> {
        self.write_record(&self.marker_path(name), marker)
    }

    /// The record of `name` matching `digest`, marker first.
    pub fn read_state(&self, name: &str, digest: &str) -> Option<AliasState> {
        [self.marker_path(name), self.state_path(name)]
            .iter()
            .filter_map(|path| read_record(path))
            .find(|state| state.digest == digest)
    }

    /// Store `state` as ownership marker when `managed`, as plain state otherwise.
    pub fn write_state(&self, name: &str, managed: bool, state: &AliasState) -> Result<()> {
        let path = if managed {
            self.marker_path(name)
        } else {
            self.state_path(name)
        };
        self.write_record(&path, state)
    }

    fn write_record(&self, path: &Path, state: &AliasState) -> Result<()> {
        let content = serde_json::to_string_pretty(state).context("Failed to serialize alias state")?;
        self.write_atomic(path, content.as_bytes())
    }

    pub fn read_cache(&self, name: &str) -> Option<ResolvedContent> {
        let path = self.cache_path(name);
        path.exists().then(|| read_content(&path))
    }

    pub fn cache_modified(&self, name: &str) -> Option<DateTime<Utc>> {
        modified(&self.cache_path(name))
    }

    pub fn write_cache(&self, name: &str, content: &ResolvedContent) -> Result<()> {
        self.write_atomic(&self.cache_path(name), content.to_snapshot_text().as_bytes())
    }

    /// Write `contents` to `path` via tempfile + rename.
    pub fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.dir);
        let mut temp_file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;

        temp_file.write_all(contents)?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist {}", path.display()))?;
        Ok(())
    }

    /// Group every file of the directory by alias name.
    ///
    /// Files whose prefix is not a valid alias name (temporary files, strays)
    /// are not reported.
    pub fn list(&self) -> Result<BTreeMap<String, StoredAlias>> {
        let mut found: BTreeMap<String, StoredAlias> = BTreeMap::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.dir.display()))
            }
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((name, suffix)) = file_name.split_once('.') else {
                continue;
            };
            if !is_valid_alias_name(name) {
                continue;
            }
            let stored = found.entry(name.to_string()).or_default();
            match suffix {
                SNAPSHOT_SUFFIX => stored.has_snapshot = true,
                MARKER_SUFFIX => stored.has_marker = true,
                _ => {}
            }
            stored.files.push(entry.path());
        }

        for stored in found.values_mut() {
            stored.files.sort();
        }
        Ok(found)
    }
}

fn read_content(path: &Path) -> ResolvedContent {
    match fs::read_to_string(path) {
        Ok(text) => ResolvedContent::from_snapshot_text(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => ResolvedContent::new(),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            ResolvedContent::new()
        }
    }
}

fn read_record(path: &Path) -> Option<AliasState> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Ignoring malformed alias state {}: {}", path.display(), e);
            None
        }
    }
}

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SnapshotStore) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_paths() {
        let store = SnapshotStore::new("/var/db/aliastables");
        assert_eq!(
            store.snapshot_path("lan"),
            PathBuf::from("/var/db/aliastables/lan.txt")
        );
        assert_eq!(
            store.marker_path("lan"),
            PathBuf::from("/var/db/aliastables/lan.marker.json")
        );
        assert_eq!(
            store.cache_path("lan"),
            PathBuf::from("/var/db/aliastables/lan.cache.txt")
        );
    }

    #[test]
    fn test_snapshot_round_trip_sorted() {
        let (_dir, store) = store();
        let content: ResolvedContent = ["10.0.0.2", "10.0.0.1"].into_iter().collect();
        store.write_snapshot("lan", &content).unwrap();

        let text = fs::read_to_string(store.snapshot_path("lan")).unwrap();
        assert_eq!(text, "10.0.0.1\n10.0.0.2");
        assert_eq!(store.read_snapshot("lan"), content);
        assert!(store.snapshot_modified("lan").is_some());
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let (_dir, store) = store();
        assert!(store.read_snapshot("nothing").is_empty());
        assert!(store.snapshot_modified("nothing").is_none());
        assert!(store.read_cache("nothing").is_none());
    }

    #[test]
    fn test_write_replaces_existing() {
        let (_dir, store) = store();
        store
            .write_snapshot("lan", &["a"].into_iter().collect())
            .unwrap();
        store
            .write_snapshot("lan", &["b", "c"].into_iter().collect())
            .unwrap();
        assert_eq!(store.read_snapshot("lan").len(), 2);
        // No temporary files left behind
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let store = SnapshotStore::new("/nonexistent/aliastables");
        assert!(store.write_snapshot("lan", &ResolvedContent::new()).is_err());
    }

    #[test]
    fn test_marker_round_trip() {
        let (_dir, store) = store();
        let marker = AliasState::new("sha256:abc", Utc::now());
        store.write_marker("lan", &marker).unwrap();
        assert_eq!(store.read_marker("lan"), Some(marker));
    }

    #[test]
    fn test_state_file_is_not_a_marker() {
        let (_dir, store) = store();
        let state = AliasState::new("sha256:abc", Utc::now());
        store.write_state("partner", false, &state).unwrap();

        assert!(store.state_path("partner").exists());
        assert!(store.read_marker("partner").is_none());
        assert_eq!(store.read_state("partner", "sha256:abc"), Some(state));
        assert!(store.read_state("partner", "sha256:other").is_none());
        assert!(!store.list().unwrap()["partner"].has_marker);
    }

    #[test]
    fn test_read_state_matches_digest() {
        let (_dir, store) = store();
        let old = AliasState::new("sha256:old", Utc::now() - chrono::Duration::days(1));
        let new = AliasState::new("sha256:new", Utc::now());
        store.write_state("lan", true, &old).unwrap();
        store.write_state("lan", false, &new).unwrap();

        assert_eq!(store.read_state("lan", "sha256:old"), Some(old));
        assert_eq!(store.read_state("lan", "sha256:new"), Some(new));
    }

    #[test]
    fn test_snapshot_written_uses_applied_watermark() {
        let (_dir, store) = store();
        assert!(store.snapshot_written("lan", "d").is_none());

        store.write_snapshot("lan", &ResolvedContent::new()).unwrap();
        let modified = store.snapshot_modified("lan").unwrap();
        assert_eq!(store.snapshot_written("lan", "d"), Some(modified));

        let later = modified + chrono::Duration::milliseconds(5);
        let mut state = AliasState::new("d", modified);
        state.applied = Some(later);
        store.write_marker("lan", &state).unwrap();
        assert_eq!(store.snapshot_written("lan", "d"), Some(later));

        // A record for another definition says nothing about this one
        assert_eq!(store.snapshot_written("lan", "other"), Some(modified));

        // Older watermarks never move the time backwards
        state.applied = Some(modified - chrono::Duration::hours(1));
        store.write_marker("lan", &state).unwrap();
        assert_eq!(store.snapshot_written("lan", "d"), Some(modified));
    }

    #[test]
    fn test_malformed_marker_ignored() {
        let (_dir, store) = store();
        fs::write(store.marker_path("lan"), "not json").unwrap();
        assert!(store.read_marker("lan").is_none());
    }

    #[test]
    fn test_list_groups_by_alias() {
        let (_dir, store) = store();
        store.write_snapshot("owned", &ResolvedContent::new()).unwrap();
        store
            .write_marker("owned", &AliasState::new("", Utc::now()))
            .unwrap();
        store.write_cache("owned", &ResolvedContent::new()).unwrap();
        store.write_snapshot("foreign", &ResolvedContent::new()).unwrap();
        store.write_cache("leftover", &ResolvedContent::new()).unwrap();
        fs::write(store.dir().join(".tmpXYZ"), "").unwrap();
        fs::write(store.dir().join("README"), "").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed["owned"].has_marker);
        assert!(listed["owned"].has_snapshot);
        assert_eq!(listed["owned"].files.len(), 3);
        assert!(!listed["foreign"].has_marker);
        assert_eq!(listed["foreign"].files.len(), 1);
        assert!(!listed["leftover"].has_snapshot);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let store = SnapshotStore::new("/nonexistent/aliastables");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("a/b"));
        store.ensure_dir().unwrap();
        assert!(store.dir().is_dir());
    }
}
