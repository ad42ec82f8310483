//! Persistence port (§6): "a key-structured document with sections for
//! posts, slides, retractions, reactions, bookmarks, tickets, trust edges,
//! nicknames, tags, mutes, and notification state. All mutations are
//! idempotent by id; the port must serialize writes."

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

/// The fixed section names named in §6, kept as constants rather than a
/// closed enum so a deployer can add application-specific sections
/// without touching this crate.
pub mod sections {
    pub const POSTS: &str = "posts";
    pub const SLIDES: &str = "slides";
    pub const RETRACTIONS: &str = "retractions";
    pub const REACTIONS: &str = "reactions";
    pub const BOOKMARKS: &str = "bookmarks";
    pub const TICKETS: &str = "tickets";
    pub const TRUST_EDGES: &str = "trust_edges";
    pub const NICKNAMES: &str = "nicknames";
    pub const TAGS: &str = "tags";
    pub const MUTES: &str = "mutes";
    pub const NOTIFICATIONS: &str = "notifications";
}

pub trait PersistencePort: Send + Sync {
    fn put(&self, section: &str, id: &str, value: Value) -> Result<(), crate::CoreError>;
    fn get(&self, section: &str, id: &str) -> Result<Option<Value>, crate::CoreError>;
    fn remove(&self, section: &str, id: &str) -> Result<(), crate::CoreError>;
    fn list(&self, section: &str) -> Result<Vec<(String, Value)>, crate::CoreError>;
}

type Document = BTreeMap<String, BTreeMap<String, Value>>;

/// Single JSON file on disk holding the whole document, section-keyed.
/// Writes are serialized behind a mutex and committed with a
/// write-to-temp-then-rename, grounded in the write-then-atomically-rename
/// idiom used for on-disk replay-guard state in the corpus.
pub struct JsonFilePersistence {
    path: PathBuf,
    document: Mutex<Document>,
}

impl JsonFilePersistence {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, crate::CoreError> {
        let path = path.into();
        let document = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| crate::CoreError::Unavailable(format!("reading {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| crate::CoreError::InvalidInput(format!("corrupt persistence document: {e}")))?
        } else {
            Document::new()
        };
        Ok(Self { path, document: Mutex::new(document) })
    }

    fn flush(&self, document: &Document) -> Result<(), crate::CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| crate::CoreError::Unavailable(format!("creating {}: {e}", parent.display())))?;
            }
        }
        let encoded = serde_json::to_string_pretty(document)
            .map_err(|e| crate::CoreError::Unavailable(format!("encoding persistence document: {e}")))?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)
                .map_err(|e| crate::CoreError::Unavailable(format!("creating {}: {e}", tmp_path.display())))?;
            tmp.write_all(encoded.as_bytes())
                .map_err(|e| crate::CoreError::Unavailable(format!("writing {}: {e}", tmp_path.display())))?;
        }
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| crate::CoreError::Unavailable(format!("renaming into {}: {e}", self.path.display())))
    }
}

impl PersistencePort for JsonFilePersistence {
    fn put(&self, section: &str, id: &str, value: Value) -> Result<(), crate::CoreError> {
        let mut document = self.document.lock();
        document.entry(section.to_string()).or_default().insert(id.to_string(), value);
        self.flush(&document)
    }

    fn get(&self, section: &str, id: &str) -> Result<Option<Value>, crate::CoreError> {
        let document = self.document.lock();
        Ok(document.get(section).and_then(|s| s.get(id)).cloned())
    }

    fn remove(&self, section: &str, id: &str) -> Result<(), crate::CoreError> {
        let mut document = self.document.lock();
        if let Some(s) = document.get_mut(section) {
            s.remove(id);
        }
        self.flush(&document)
    }

    fn list(&self, section: &str) -> Result<Vec<(String, Value)>, crate::CoreError> {
        let document = self.document.lock();
        Ok(document.get(section).map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default())
    }
}

/// Pure in-memory persistence for unit tests that don't need disk I/O.
#[derive(Default)]
pub struct InMemoryPersistence {
    document: Mutex<Document>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistencePort for InMemoryPersistence {
    fn put(&self, section: &str, id: &str, value: Value) -> Result<(), crate::CoreError> {
        self.document.lock().entry(section.to_string()).or_default().insert(id.to_string(), value);
        Ok(())
    }

    fn get(&self, section: &str, id: &str) -> Result<Option<Value>, crate::CoreError> {
        Ok(self.document.lock().get(section).and_then(|s| s.get(id)).cloned())
    }

    fn remove(&self, section: &str, id: &str) -> Result<(), crate::CoreError> {
        if let Some(s) = self.document.lock().get_mut(section) {
            s.remove(id);
        }
        Ok(())
    }

    fn list(&self, section: &str) -> Result<Vec<(String, Value)>, crate::CoreError> {
        Ok(self.document.lock().get(section).map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_and_get_round_trip_in_memory() {
        let store = InMemoryPersistence::new();
        store.put(sections::POSTS, "p1", json!({"content": "hi"})).unwrap();
        assert_eq!(store.get(sections::POSTS, "p1").unwrap(), Some(json!({"content": "hi"})));
    }

    #[test]
    fn json_file_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = JsonFilePersistence::open(&path).unwrap();
            store.put(sections::TICKETS, "t1", json!({"owner": "aa"})).unwrap();
        }
        let reopened = JsonFilePersistence::open(&path).unwrap();
        assert_eq!(reopened.get(sections::TICKETS, "t1").unwrap(), Some(json!({"owner": "aa"})));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = InMemoryPersistence::new();
        store.put(sections::MUTES, "m1", json!(true)).unwrap();
        store.remove(sections::MUTES, "m1").unwrap();
        store.remove(sections::MUTES, "m1").unwrap();
        assert_eq!(store.get(sections::MUTES, "m1").unwrap(), None);
    }

    #[test]
    fn list_returns_all_entries_in_a_section() {
        let store = InMemoryPersistence::new();
        store.put(sections::TAGS, "a", json!(1)).unwrap();
        store.put(sections::TAGS, "b", json!(2)).unwrap();
        assert_eq!(store.list(sections::TAGS).unwrap().len(), 2);
    }
}
