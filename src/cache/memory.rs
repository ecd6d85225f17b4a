use super::{CacheError, CacheKey, CompletionCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-process cache backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    disabled: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CompletionCache for MemoryCache {
    fn exists(&self, key: &CacheKey) -> bool {
        !self.is_disabled() && self.entries().contains_key(key.as_str())
    }

    fn load(&self, key: &CacheKey) -> Result<String, CacheError> {
        if self.is_disabled() {
            return Err(CacheError::Miss {
                key: key.to_string(),
            });
        }
        self.entries()
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| CacheError::Miss {
                key: key.to_string(),
            })
    }

    fn store(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        self.entries()
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}
