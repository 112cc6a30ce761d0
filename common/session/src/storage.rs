use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StorageError, StorageResult};

/// Default lifetime of a durable token slot.
pub const DEFAULT_DURABLE_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// A key/value slot backend that can hold the bearer token.
pub trait TokenStorage: Send + Sync {
    fn read(&self, key: &str) -> StorageResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;
    fn clear(&self, key: &str) -> StorageResult<()>;
}

/// Process-scoped storage. Used as the session fallback slot and as the
/// test double for either slot.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStorage for MemoryStorage {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        let mut guard = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        guard.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileContents {
    #[serde(default)]
    entries: HashMap<String, FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Durable storage backed by a JSON file. Every write stamps the entry with
/// `now + ttl`; entries past that instant read as absent, which gives the
/// slot cookie-like max-age semantics across restarts.
#[derive(Clone)]
pub struct FileStorage {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::seconds(DEFAULT_DURABLE_TTL_SECONDS),
            clock: Arc::new(SystemClock),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = Duration::seconds(seconds);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn load(&self) -> StorageResult<FileContents> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FileContents::default()),
            Err(err) => return Err(self.io_error(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(FileContents::default());
        }
        serde_json::from_slice(&bytes).map_err(|err| StorageError::Corrupt {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })
    }

    fn persist(&self, contents: &FileContents) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }
        let body = serde_json::to_vec_pretty(contents).map_err(|err| StorageError::Corrupt {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, body).map_err(|err| self.io_error(err))?;
        fs::rename(&staging, &self.path).map_err(|err| self.io_error(err))
    }

    // A corrupt file is replaced wholesale on the next write.
    fn load_for_update(&self) -> StorageResult<FileContents> {
        match self.load() {
            Err(StorageError::Corrupt { path, message }) => {
                warn!(path = %path, error = %message, "discarding corrupt session file");
                Ok(FileContents::default())
            }
            other => other,
        }
    }

    fn io_error(&self, err: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl TokenStorage for FileStorage {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let contents = self.load()?;
        let now = self.now();
        match contents.entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(entry) => {
                debug!(key, expires_at = %entry.expires_at, "durable session entry past max-age");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut contents = self.load_for_update()?;
        let now = self.now();
        contents.entries.retain(|_, entry| entry.expires_at > now);
        contents.entries.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at: now + self.ttl,
            },
        );
        self.persist(&contents)
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut contents = self.load_for_update()?;
        if contents.entries.remove(key).is_none() && !self.path.exists() {
            return Ok(());
        }
        self.persist(&contents)
    }
}
