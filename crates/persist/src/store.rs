//! Durable record stores.
//!
//! Layout of a file-backed store directory:
//! ```text
//! store.meta.json   - schema version, revision, SHA-256 of worlds.yml
//! worlds.yml        - spawn point and one entry per world
//! ```

use buildworld_kernel::{SpawnPoint, WorldRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::stored::WorldsDocument;

/// Current schema version of the records document.
const STORE_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const RECORDS_FILE: &str = "worlds.yml";

/// Errors from durable store operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store is read-only")]
    ReadOnly,
}

/// Durable map from world name to record, plus the global spawn point.
///
/// Implementations are moved onto the background writer thread, hence `Send`.
pub trait RecordStore: Send {
    fn load_all(&self) -> Result<Vec<WorldRecord>, PersistError>;
    fn save(&mut self, record: &WorldRecord) -> Result<(), PersistError>;
    fn delete(&mut self, name: &str) -> Result<(), PersistError>;
    fn load_spawn(&self) -> Result<Option<SpawnPoint>, PersistError>;
    fn save_spawn(&mut self, spawn: Option<&SpawnPoint>) -> Result<(), PersistError>;
}

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    /// Incremented on every write of the records document.
    pub revision: u64,
    pub records_sha256: Option<String>,
}

/// File-backed store writing the whole document on every change.
pub struct YamlRecordStore {
    root: PathBuf,
    meta: StoreMeta,
    doc: WorldsDocument,
}

impl YamlRecordStore {
    /// Open or create a store at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let meta_path = root.join(META_FILE);
        let records_path = root.join(RECORDS_FILE);

        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(PersistError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                schema_version: STORE_SCHEMA_VERSION,
                revision: 0,
                records_sha256: None,
            };
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            meta
        };

        let doc = if records_path.exists() {
            let text = std::fs::read_to_string(&records_path)?;
            if text.trim().is_empty() {
                WorldsDocument::default()
            } else {
                serde_yaml::from_str(&text)?
            }
        } else {
            WorldsDocument::default()
        };

        tracing::debug!(root = %root.display(), worlds = doc.worlds.len(), "opened record store");
        Ok(Self { root, meta, doc })
    }

    /// Compare worlds.yml against the checksum recorded at the last write.
    pub fn verify_integrity(&self) -> Result<(), PersistError> {
        let records_path = self.root.join(RECORDS_FILE);
        let Some(expected) = self.meta.records_sha256.as_ref() else {
            // Never written through this store; nothing to compare against.
            return Ok(());
        };
        let data = std::fs::read(&records_path)?;
        let actual = sha256_hex(&data);
        if &actual != expected {
            return Err(PersistError::IntegrityMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    pub fn document(&self) -> &WorldsDocument {
        &self.doc
    }

    /// Write the document through a temporary file, then the metadata.
    fn write(&mut self) -> Result<(), PersistError> {
        let text = serde_yaml::to_string(&self.doc)?;
        let records_path = self.root.join(RECORDS_FILE);
        let tmp_path = self.root.join(format!("{RECORDS_FILE}.tmp"));
        std::fs::write(&tmp_path, text.as_bytes())?;
        std::fs::rename(&tmp_path, &records_path)?;

        self.meta.revision += 1;
        self.meta.records_sha256 = Some(sha256_hex(text.as_bytes()));
        let meta_path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(meta_path)?, &self.meta)?;
        Ok(())
    }
}

impl RecordStore for YamlRecordStore {
    fn load_all(&self) -> Result<Vec<WorldRecord>, PersistError> {
        Ok(self.doc.records())
    }

    fn save(&mut self, record: &WorldRecord) -> Result<(), PersistError> {
        self.doc.upsert(record);
        self.write()
    }

    fn delete(&mut self, name: &str) -> Result<(), PersistError> {
        if self.doc.remove(name) {
            self.write()?;
        }
        Ok(())
    }

    fn load_spawn(&self) -> Result<Option<SpawnPoint>, PersistError> {
        Ok(self.doc.spawn_point())
    }

    fn save_spawn(&mut self, spawn: Option<&SpawnPoint>) -> Result<(), PersistError> {
        self.doc.set_spawn_point(spawn);
        self.write()
    }
}

/// In-memory store. Clones share the same document, so a test can keep a
/// handle while the writer thread owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    doc: Arc<Mutex<WorldsDocument>>,
    read_only: Arc<Mutex<bool>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: &[WorldRecord]) -> Self {
        let store = Self::new();
        {
            let mut doc = store.doc.lock();
            for record in records {
                doc.upsert(record);
            }
        }
        store
    }

    /// Make every write fail with [`PersistError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.lock() = read_only;
    }

    pub fn snapshot(&self) -> WorldsDocument {
        self.doc.lock().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.doc
            .lock()
            .worlds
            .keys()
            .any(|key| key.eq_ignore_ascii_case(name))
    }

    fn check_writable(&self) -> Result<(), PersistError> {
        if *self.read_only.lock() {
            return Err(PersistError::ReadOnly);
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn load_all(&self) -> Result<Vec<WorldRecord>, PersistError> {
        Ok(self.doc.lock().records())
    }

    fn save(&mut self, record: &WorldRecord) -> Result<(), PersistError> {
        self.check_writable()?;
        self.doc.lock().upsert(record);
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<(), PersistError> {
        self.check_writable()?;
        self.doc.lock().remove(name);
        Ok(())
    }

    fn load_spawn(&self) -> Result<Option<SpawnPoint>, PersistError> {
        Ok(self.doc.lock().spawn_point())
    }

    fn save_spawn(&mut self, spawn: Option<&SpawnPoint>) -> Result<(), PersistError> {
        self.check_writable()?;
        self.doc.lock().set_spawn_point(spawn);
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
