use super::{CacheError, CacheKey, CompletionCache};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Directory-backed cache storing one file per key.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so readers see either the old or the new value.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    disabled: AtomicBool,
}

impl FileCache {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    fn write_atomic(&self, path: &Path, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        staged.write_all(value.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(path)?;
        Ok(())
    }
}

impl CompletionCache for FileCache {
    fn exists(&self, key: &CacheKey) -> bool {
        !self.is_disabled() && self.entry_path(key).is_file()
    }

    fn load(&self, key: &CacheKey) -> Result<String, CacheError> {
        if self.is_disabled() {
            return Err(CacheError::Miss {
                key: key.to_string(),
            });
        }
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CacheError::Miss {
                key: key.to_string(),
            }),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn store(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        self.write_atomic(&path, value)
            .map_err(|source| CacheError::Io {
                key: key.to_string(),
                source,
            })?;
        tracing::debug!(key = %key, bytes = value.len(), "cache entry stored");
        Ok(())
    }

    fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{decode_value, derive_key, encode_value};
    use std::thread;

    #[test]
    fn store_then_load_returns_original_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(temp.path().join("nested"));
        let key = derive_key("cozebot", "english", "a configmap");
        let text = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: demo\n";

        cache.store(&key, &encode_value(text)).expect("store");
        assert!(cache.exists(&key));
        let loaded = cache.load(&key).expect("load");
        assert_eq!(decode_value(&key, &loaded).expect("decode"), text);
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(temp.path().to_path_buf());
        let key = derive_key("p", "l", "absent");
        assert!(!cache.exists(&key));
        assert!(matches!(cache.load(&key), Err(CacheError::Miss { .. })));
    }

    #[test]
    fn store_overwrites_previous_value() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(temp.path().to_path_buf());
        let key = derive_key("p", "l", "r");
        cache.store(&key, "first").expect("store first");
        cache.store(&key, "second").expect("store second");
        assert_eq!(cache.load(&key).expect("load"), "second");
    }

    #[test]
    fn disabled_cache_still_writes_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(temp.path().to_path_buf());
        let key = derive_key("p", "l", "r");
        cache.disable();
        assert!(!cache.exists(&key));
        cache.store(&key, "warm").expect("store while disabled");
        assert!(!cache.exists(&key));
        assert_eq!(
            fs::read_to_string(temp.path().join(key.as_str())).expect("read entry"),
            "warm"
        );
    }

    #[test]
    fn unwritable_directory_surfaces_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").expect("write blocker");
        let cache = FileCache::new(blocker);
        let key = derive_key("p", "l", "r");
        assert!(matches!(
            cache.store(&key, "value"),
            Err(CacheError::Io { .. })
        ));
    }

    #[test]
    fn concurrent_stores_on_one_key_never_tear() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(temp.path().to_path_buf());
        let key = derive_key("p", "l", "r");
        let values: Vec<String> = (0..6).map(|idx| format!("{idx}").repeat(4096)).collect();
        thread::scope(|scope| {
            for value in &values {
                let cache = &cache;
                let key = &key;
                scope.spawn(move || cache.store(key, value).expect("store"));
            }
        });
        let loaded = cache.load(&key).expect("load");
        assert!(values.contains(&loaded));
    }
}
