//! Durable per-project permit storage on the local machine.
//!
//! One entry per project, keyed `permits_<project>`, holding the full JSON
//! array of records. Saves replace the whole entry; there is no append.
//!
//! A second entry per project, keyed `pending_<project>`, holds permits
//! whose publish to the remote sheet failed and has not yet been retried.
//!
//! ## Layout
//!
//! ```text
//! ~/.local/share/permit-log/
//!   permits_TWS%20O-16123.json
//!   permits_TW%20O-16124.json
//!   pending_TWS%20O-16123.json
//! ```
//!
//! Keys are percent-encoded into file names so any project string is safe.

use std::path::{Path, PathBuf};

use crate::permit::Permit;

/// Prefix of every storage key.
pub const KEY_PREFIX: &str = "permits_";

/// Prefix of the unpublished-permit queue keys.
pub const PENDING_KEY_PREFIX: &str = "pending_";

const FILE_EXTENSION: &str = "json";

/// Errors from the local store.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("could not determine the user data directory")]
    NoDataDir,
}

/// Storage key for a project partition.
pub fn storage_key(project: &str) -> String {
    format!("{KEY_PREFIX}{project}")
}

/// Key of the unpublished-permit queue for a project partition.
pub fn pending_key(project: &str) -> String {
    format!("{PENDING_KEY_PREFIX}{project}")
}

/// File-backed store. Writes land on disk before `save` returns.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a store at the XDG data directory (`~/.local/share/permit-log/`).
    pub fn new() -> Result<Self, LocalStoreError> {
        let data_dir = default_data_dir().ok_or(LocalStoreError::NoDataDir)?;
        Self::with_base_dir(data_dir)
    }

    /// Create a store with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, LocalStoreError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file = format!("{}.{FILE_EXTENSION}", urlencoding::encode(key));
        self.base_dir.join(file)
    }

    /// Atomically write `data` to `path` via a `.tmp` sibling.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), LocalStoreError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // ── Read ─────────────────────────────────────────────────────────────

    /// Strict read: `Ok(None)` when nothing is stored, `Err` when the entry
    /// cannot be read or parsed.
    pub fn read(&self, project: &str) -> Result<Option<Vec<Permit>>, LocalStoreError> {
        self.read_key(&storage_key(project))
    }

    fn read_key(&self, key: &str) -> Result<Option<Vec<Permit>>, LocalStoreError> {
        let path = self.entry_path(key);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let permits: Vec<Permit> = serde_json::from_str(&data)?;
        Ok(Some(permits))
    }

    /// Stored permits for `project`, newest first.
    ///
    /// Never fails: an absent entry is empty, and an unreadable or corrupt
    /// entry is logged and treated as empty.
    pub fn load(&self, project: &str) -> Vec<Permit> {
        self.load_key(&storage_key(project))
    }

    /// Permits for `project` still waiting to reach the remote, newest first.
    pub fn load_pending(&self, project: &str) -> Vec<Permit> {
        self.load_key(&pending_key(project))
    }

    fn load_key(&self, key: &str) -> Vec<Permit> {
        match self.read_key(key) {
            Ok(Some(permits)) => permits,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Local storage for '{key}' is unreadable, starting empty: {e}");
                Vec::new()
            }
        }
    }

    // ── Write ────────────────────────────────────────────────────────────

    /// Replace the stored sequence for `project` with `permits`.
    pub fn save(&self, project: &str, permits: &[Permit]) -> Result<(), LocalStoreError> {
        self.save_key(&storage_key(project), permits)
    }

    /// Replace the unpublished-permit queue for `project`. An empty queue
    /// removes the entry.
    pub fn save_pending(&self, project: &str, permits: &[Permit]) -> Result<(), LocalStoreError> {
        let key = pending_key(project);
        if permits.is_empty() {
            return match std::fs::remove_file(self.entry_path(&key)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }
        self.save_key(&key, permits)
    }

    fn save_key(&self, key: &str, permits: &[Permit]) -> Result<(), LocalStoreError> {
        let json = serde_json::to_string_pretty(permits)?;
        self.atomic_write(&self.entry_path(key), json.as_bytes())?;
        tracing::debug!("Saved {} permit(s) under '{key}'", permits.len());
        Ok(())
    }

    // ── Scan ─────────────────────────────────────────────────────────────

    /// Projects that currently have a stored entry, sorted.
    pub fn projects(&self) -> Result<Vec<String>, LocalStoreError> {
        let mut projects = Vec::new();
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(&format!(".{FILE_EXTENSION}")) else {
                continue;
            };
            if let Ok(key) = urlencoding::decode(stem)
                && let Some(project) = key.strip_prefix(KEY_PREFIX)
            {
                projects.push(project.to_string());
            }
        }

        projects.sort();
        Ok(projects)
    }
}

/// Default data directory (`<XDG data dir>/permit-log`).
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("permit-log"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::permit::{PermitDraft, PermitType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::with_base_dir(dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn permit(project: &str, location: &str) -> Permit {
        Permit::new(
            project,
            PermitDraft {
                permit_type: Some(PermitType::Lifting),
                date: "2024-05-02".to_string(),
                location: location.to_string(),
                contractor: "Acme".to_string(),
                supervisor: "R. Diaz".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn absent_entry_loads_empty() {
        let (_dir, store) = store();
        assert!(store.load("TWS O-16123").is_empty());
        assert!(store.read("TWS O-16123").unwrap().is_none());
    }

    #[test]
    fn save_then_load_preserves_order_and_fields() {
        let (_dir, store) = store();
        let permits = vec![permit("P", "North gate"), permit("P", "South gate")];
        store.save("P", &permits).unwrap();
        assert_eq!(store.load("P"), permits);
    }

    #[test]
    fn save_replaces_rather_than_appends() {
        let (_dir, store) = store();
        store
            .save("P", &[permit("P", "a"), permit("P", "b")])
            .unwrap();
        let replacement = vec![permit("P", "c")];
        store.save("P", &replacement).unwrap();
        assert_eq!(store.load("P"), replacement);
    }

    #[test]
    fn partitions_are_isolated() {
        let (_dir, store) = store();
        store.save("TWS O-16123", &[permit("TWS O-16123", "a")]).unwrap();
        assert!(store.load("TW O-16124").is_empty());
    }

    #[test]
    fn corrupt_entry_degrades_to_empty() {
        let (_dir, store) = store();
        std::fs::write(store.entry_path(&storage_key("P")), "{ not json").unwrap();
        assert!(store.load("P").is_empty());
        assert!(matches!(store.read("P"), Err(LocalStoreError::Serde(_))));
    }

    #[test]
    fn keys_with_separators_stay_inside_base_dir() {
        let (_dir, store) = store();
        let path = store.entry_path(&storage_key("../site/B"));
        assert_eq!(path.parent(), Some(store.base_dir()));
        store.save("../site/B", &[permit("../site/B", "x")]).unwrap();
        assert_eq!(store.load("../site/B").len(), 1);
    }

    #[test]
    fn pending_queue_is_separate_and_clears() {
        let (_dir, store) = store();
        let queued = vec![permit("P", "Yard")];
        store.save_pending("P", &queued).unwrap();

        assert_eq!(store.load_pending("P"), queued);
        assert!(store.load("P").is_empty());
        assert_eq!(store.projects().unwrap(), Vec::<String>::new());

        store.save_pending("P", &[]).unwrap();
        assert!(store.load_pending("P").is_empty());
        assert!(!store.entry_path(&pending_key("P")).exists());
        store.save_pending("P", &[]).unwrap();
    }

    #[test]
    fn lists_stored_projects() {
        let (_dir, store) = store();
        store.save("TW O-16124", &[]).unwrap();
        store.save("TWS O-16123", &[permit("TWS O-16123", "a")]).unwrap();
        std::fs::write(store.base_dir().join("notes.txt"), "ignore me").unwrap();
        assert_eq!(
            store.projects().unwrap(),
            vec!["TW O-16124".to_string(), "TWS O-16123".to_string()]
        );
    }
}
