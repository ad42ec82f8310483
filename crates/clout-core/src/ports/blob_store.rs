//! Content-addressed blob store port (§6).

use std::fs;
use std::path::PathBuf;

use clout_crypto::canonical;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub cid: String,
    pub mime: String,
    pub size: u64,
    pub stored_at: u64,
}

pub trait BlobStorePort: Send + Sync {
    fn put(&self, bytes: &[u8], mime: &str, filename: Option<&str>) -> Result<BlobMetadata, crate::CoreError>;
    fn get(&self, cid: &str) -> Result<Option<Vec<u8>>, crate::CoreError>;
    fn has(&self, cid: &str) -> Result<bool, crate::CoreError>;
    fn delete(&self, cid: &str) -> Result<(), crate::CoreError>;
    fn list(&self) -> Result<Vec<String>, crate::CoreError>;
}

fn cid_for(bytes: &[u8]) -> String {
    format!("bafy{}", canonical::to_hex(&canonical::sha256(bytes)))
}

/// Filesystem-backed blob store: one file per CID under `root`, a
/// sidecar `.meta.json` carrying mime/filename/stored-at.
pub struct FsBlobStore {
    root: PathBuf,
    now_source: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl FsBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, crate::CoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| crate::CoreError::Unavailable(format!("creating {}: {e}", root.display())))?;
        Ok(Self { root, now_source: Box::new(current_unix_millis) })
    }

    fn blob_path(&self, cid: &str) -> PathBuf {
        self.root.join(cid)
    }

    fn meta_path(&self, cid: &str) -> PathBuf {
        self.root.join(format!("{cid}.meta.json"))
    }
}

fn current_unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

impl BlobStorePort for FsBlobStore {
    fn put(&self, bytes: &[u8], mime: &str, _filename: Option<&str>) -> Result<BlobMetadata, crate::CoreError> {
        let cid = cid_for(bytes);
        let metadata = BlobMetadata { cid: cid.clone(), mime: mime.to_string(), size: bytes.len() as u64, stored_at: (self.now_source)() };
        fs::write(self.blob_path(&cid), bytes).map_err(|e| crate::CoreError::Unavailable(format!("writing blob: {e}")))?;
        let encoded = serde_json::to_vec(&metadata).map_err(|e| crate::CoreError::Unavailable(format!("encoding blob metadata: {e}")))?;
        fs::write(self.meta_path(&cid), encoded).map_err(|e| crate::CoreError::Unavailable(format!("writing blob metadata: {e}")))?;
        Ok(metadata)
    }

    fn get(&self, cid: &str) -> Result<Option<Vec<u8>>, crate::CoreError> {
        match fs::read(self.blob_path(cid)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::CoreError::Unavailable(format!("reading blob: {e}"))),
        }
    }

    fn has(&self, cid: &str) -> Result<bool, crate::CoreError> {
        Ok(self.blob_path(cid).exists())
    }

    fn delete(&self, cid: &str) -> Result<(), crate::CoreError> {
        let _ = fs::remove_file(self.blob_path(cid));
        let _ = fs::remove_file(self.meta_path(cid));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, crate::CoreError> {
        let mut out = vec![];
        let entries = fs::read_dir(&self.root).map_err(|e| crate::CoreError::Unavailable(format!("listing blobs: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| crate::CoreError::Unavailable(format!("listing blobs: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".meta.json") {
                out.push(name);
            }
        }
        Ok(out)
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, BlobMetadata)>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStorePort for InMemoryBlobStore {
    fn put(&self, bytes: &[u8], mime: &str, _filename: Option<&str>) -> Result<BlobMetadata, crate::CoreError> {
        let cid = cid_for(bytes);
        let metadata = BlobMetadata { cid: cid.clone(), mime: mime.to_string(), size: bytes.len() as u64, stored_at: 0 };
        self.blobs.lock().insert(cid, (bytes.to_vec(), metadata.clone()));
        Ok(metadata)
    }

    fn get(&self, cid: &str) -> Result<Option<Vec<u8>>, crate::CoreError> {
        Ok(self.blobs.lock().get(cid).map(|(bytes, _)| bytes.clone()))
    }

    fn has(&self, cid: &str) -> Result<bool, crate::CoreError> {
        Ok(self.blobs.lock().contains_key(cid))
    }

    fn delete(&self, cid: &str) -> Result<(), crate::CoreError> {
        self.blobs.lock().remove(cid);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, crate::CoreError> {
        Ok(self.blobs.lock().keys().cloned().collect())
    }
}
