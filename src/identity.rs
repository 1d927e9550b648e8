//! Remembered login identity.
//!
//! Persists one username under a single well-known key in a small JSON
//! file, so the companion can resume a logged-in session at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CompanionError, Result};

/// Key the username is stored under.
pub const USERNAME_KEY: &str = "alfred_username";

/// File-backed store for the remembered username.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remembered username, if any. A missing file means nobody is remembered.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<String>> {
        let entries = self.read_entries()?;
        Ok(entries
            .get(USERNAME_KEY)
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty()))
    }

    /// Remember `username`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn remember(&self, username: &str) -> Result<()> {
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "replacing unreadable identity file");
            BTreeMap::new()
        });
        entries.insert(USERNAME_KEY.to_owned(), username.to_owned());
        self.write_entries(&entries)
    }

    /// Forget the remembered username. Forgetting when nothing is stored succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    pub fn forget(&self) -> Result<()> {
        let mut entries = self.read_entries().unwrap_or_default();
        if entries.remove(USERNAME_KEY).is_none() && !self.path.exists() {
            return Ok(());
        }
        self.write_entries(&entries)
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            CompanionError::Identity(format!("{}: {e}", self.path.display()))
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| CompanionError::Identity(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("state").join("identity.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_nothing() {
        let (_dir, store) = store();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn remember_then_load() {
        let (_dir, store) = store();
        store.remember("alice").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("alice"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[USERNAME_KEY], "alice");
    }

    #[test]
    fn remember_replaces_previous() {
        let (_dir, store) = store();
        store.remember("alice").unwrap();
        store.remember("bob").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("bob"));
    }

    #[test]
    fn forget_clears_username() {
        let (_dir, store) = store();
        store.remember("alice").unwrap();
        store.forget().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.forget().unwrap();
    }

    #[test]
    fn forget_without_file_does_not_create_one() {
        let (_dir, store) = store();
        store.forget().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn other_keys_are_preserved() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"theme":"dark"}"#).unwrap();

        store.remember("alice").unwrap();
        store.forget().unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("theme"));
    }

    #[test]
    fn corrupt_file_is_an_error_but_remember_recovers() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        assert!(matches!(store.load(), Err(CompanionError::Identity(_))));
        store.remember("alice").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn blank_username_counts_as_absent() {
        let (_dir, store) = store();
        store.remember("   ").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
