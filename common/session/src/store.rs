use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult, StorageError};
use crate::metrics::SessionMetrics;
use crate::storage::TokenStorage;

/// Default storage key for the bearer token.
pub const DEFAULT_TOKEN_KEY: &str = "token";

struct Slots {
    primary: Arc<dyn TokenStorage>,
    fallback: Arc<dyn TokenStorage>,
}

/// Bearer token lifecycle over a primary and a fallback slot.
///
/// The primary slot is canonical. Writes go to both slots, removals clear
/// both, and a read that only finds the token in the fallback copies it back
/// into the primary before returning it.
///
/// Whether storage exists at all is decided once, at construction. A
/// [`TokenStore::detached`] store answers every read with "absent" and treats
/// writes as no-ops.
#[derive(Clone)]
pub struct TokenStore {
    slots: Option<Arc<Slots>>,
    key: Arc<str>,
    generation: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
    metrics: Option<SessionMetrics>,
}

impl TokenStore {
    pub fn new(primary: Arc<dyn TokenStorage>, fallback: Arc<dyn TokenStorage>) -> Self {
        Self {
            slots: Some(Arc::new(Slots { primary, fallback })),
            key: Arc::from(DEFAULT_TOKEN_KEY),
            generation: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
            metrics: None,
        }
    }

    /// Store for an execution context without client storage.
    pub fn detached() -> Self {
        Self {
            slots: None,
            key: Arc::from(DEFAULT_TOKEN_KEY),
            generation: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
            metrics: None,
        }
    }

    pub fn with_key(mut self, key: impl AsRef<str>) -> Self {
        self.key = Arc::from(key.as_ref());
        self
    }

    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_available(&self) -> bool {
        self.slots.is_some()
    }

    /// Incremented by every `set_token`/`remove_token`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get_token(&self) -> Option<String> {
        self.load().ok()
    }

    /// Like [`TokenStore::get_token`] but says why nothing was returned.
    pub fn load(&self) -> SessionResult<String> {
        let slots = self.slots.as_ref().ok_or(SessionError::StorageUnavailable)?;
        let observed = self.generation();

        if let Some(token) = self.read_slot("primary", slots.primary.as_ref()) {
            let mirrored = self.read_slot("fallback", slots.fallback.as_ref());
            if mirrored.as_deref() != Some(token.as_str()) {
                self.copy_back(observed, "fallback", slots.fallback.as_ref(), &token);
            }
            return Ok(token);
        }

        match self.read_slot("fallback", slots.fallback.as_ref()) {
            Some(token) => {
                debug!(key = %self.key, "restoring token from fallback storage");
                self.copy_back(observed, "primary", slots.primary.as_ref(), &token);
                Ok(token)
            }
            None => Err(SessionError::NoToken),
        }
    }

    pub fn set_token(&self, token: &str) {
        let Some(slots) = self.slots.as_ref() else {
            debug!("session storage unavailable; token not persisted");
            return;
        };
        let _guard = self.lock_writes();
        self.write_slot("primary", slots.primary.as_ref(), token);
        self.write_slot("fallback", slots.fallback.as_ref(), token);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove_token(&self) {
        let Some(slots) = self.slots.as_ref() else {
            return;
        };
        let _guard = self.lock_writes();
        self.clear_slots(slots);
    }

    /// Remove the token only if nothing was written since `generation` was
    /// observed. Returns whether the store was cleared.
    pub fn evict_if_current(&self, generation: u64) -> bool {
        let Some(slots) = self.slots.as_ref() else {
            return false;
        };
        let _guard = self.lock_writes();
        if self.generation() != generation {
            return false;
        }
        self.clear_slots(slots);
        true
    }

    fn clear_slots(&self, slots: &Slots) {
        for (slot, storage) in [("primary", &slots.primary), ("fallback", &slots.fallback)] {
            if let Err(err) = storage.clear(&self.key) {
                self.storage_failed(slot, "clear", &err);
            }
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Sync one slot from a value read under `observed`. Skipped once a
    /// set/remove has landed since, so a read never resurrects a cleared token.
    fn copy_back(
        &self,
        observed: u64,
        slot: &'static str,
        storage: &dyn TokenStorage,
        token: &str,
    ) {
        let _guard = self.lock_writes();
        if self.generation() != observed {
            debug!(slot, key = %self.key, "token changed during read; slot sync skipped");
            return;
        }
        self.write_slot(slot, storage, token);
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_slot(&self, slot: &'static str, storage: &dyn TokenStorage) -> Option<String> {
        match storage.read(&self.key) {
            Ok(Some(token)) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(err) => {
                self.storage_failed(slot, "read", &err);
                None
            }
        }
    }

    fn write_slot(&self, slot: &'static str, storage: &dyn TokenStorage, token: &str) {
        if let Err(err) = storage.write(&self.key, token) {
            self.storage_failed(slot, "write", &err);
        }
    }

    fn storage_failed(&self, slot: &'static str, op: &'static str, err: &StorageError) {
        warn!(slot, op, key = %self.key, error = %err, "token storage operation failed");
        if let Some(metrics) = &self.metrics {
            metrics.storage_failure();
        }
    }
}
