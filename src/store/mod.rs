// src/store/mod.rs - Whole-document chat database with serialized read-modify-write

use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::types::{ChatDatabase, StoreError};

/// Synchronous load/save of the whole chat database
pub trait ChatStore: Send + Sync {
    fn load(&self) -> Result<ChatDatabase, StoreError>;
    fn save(&self, database: &ChatDatabase) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChatStore for JsonFileStore {
    fn load(&self) -> Result<ChatDatabase, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Chat database {} not found, creating a new one", self.path.display());
                let empty = ChatDatabase::new();
                self.save(&empty)?;
                return Ok(empty);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(ChatDatabase::new());
        }
        serde_json::from_str(&content).map_err(StoreError::Decode)
    }

    fn save(&self, database: &ChatDatabase) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(database).map_err(StoreError::Encode)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Process-local store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    database: RwLock<ChatDatabase>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(database: ChatDatabase) -> Self {
        Self {
            database: RwLock::new(database),
        }
    }
}

impl ChatStore for MemoryStore {
    fn load(&self) -> Result<ChatDatabase, StoreError> {
        self.database
            .read()
            .map(|db| db.clone())
            .map_err(|_| StoreError::Poisoned)
    }

    fn save(&self, database: &ChatDatabase) -> Result<(), StoreError> {
        let mut guard = self.database.write().map_err(|_| StoreError::Poisoned)?;
        *guard = database.clone();
        Ok(())
    }
}

/// Serializes load-mutate-save cycles so interleaved events cannot lose updates
#[derive(Clone)]
pub struct SharedStore {
    store: Arc<dyn ChatStore>,
    lock: Arc<Mutex<()>>,
}

impl SharedStore {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run `apply` against a freshly loaded document and save the result.
    ///
    /// A failed load aborts before `apply` runs. A failed save is logged and
    /// the value computed by `apply` is still returned; that update is lost.
    pub async fn transaction<F, R>(&self, apply: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut ChatDatabase) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut database = self.store.load()?;
        let result = apply(&mut database);
        if let Err(e) = self.store.save(&database) {
            error!("Failed to save chat database: {}", e);
        } else {
            debug!("Chat database saved ({} records)", database.len());
        }
        Ok(result)
    }

    /// Read-only snapshot of the current document
    pub async fn snapshot(&self) -> Result<ChatDatabase, StoreError> {
        let _guard = self.lock.lock().await;
        self.store.load()
    }
}

/// Memory store whose loads and saves can be made to fail
#[cfg(test)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
    loads_left: std::sync::atomic::AtomicUsize,
    fail_saves: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FailingStore {
    pub(crate) fn new(database: ChatDatabase) -> Self {
        Self {
            inner: MemoryStore::with_database(database),
            loads_left: std::sync::atomic::AtomicUsize::new(usize::MAX),
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Allow `count` more loads, then fail every one after
    pub(crate) fn fail_loads_after(&self, count: usize) {
        self.loads_left.store(count, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn fail_saves(&self) {
        self.fail_saves.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn simulated(&self) -> StoreError {
        StoreError::Read {
            path: PathBuf::from("simulated.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
        }
    }
}

#[cfg(test)]
impl ChatStore for FailingStore {
    fn load(&self) -> Result<ChatDatabase, StoreError> {
        use std::sync::atomic::Ordering;
        let allowed = self
            .loads_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(self.simulated());
        }
        self.inner.load()
    }

    fn save(&self, database: &ChatDatabase) -> Result<(), StoreError> {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: PathBuf::from("simulated.json"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
            });
        }
        self.inner.save(database)
    }
}
