//! # Example store
//!
//! Persists byte buffers between runs so that failures found once are
//! replayed first next time, and regressions stay covered after a fix.
//!
//! - [`ExampleStore`]: the `save` / `fetch` / `delete` interface. All methods
//!   take `&self` and every key's value set is independently addressable, so
//!   several processes (or threads) may share a backend without a global lock.
//! - [`StoreKey`]: a SHA-256 digest of the test's identity, plus an optional
//!   sub-key naming a secondary corpus.
//! - [`InMemoryStore`]: a map behind a `RwLock`, for tests and ephemeral use.
//! - [`DirectoryStore`]: one directory per key, one file per value. Values
//!   are content addressed and written to a temporary file in the key's
//!   directory which is then atomically persisted into place, so a reader
//!   never observes a partial value.
//!
//! ```no_run
//! use conjecture_kernel::store::{DirectoryStore, ExampleStore, StoreKey};
//!
//! let store = DirectoryStore::new("./.conjecture/examples")?;
//! let key = StoreKey::from_identity(b"vecs(integers::<u8>(), 0, 10)");
//! store.save(&key, &[1, 0, 1, 0, 0])?;
//! assert!(!store.fetch(&key)?.is_empty());
//! # Ok::<(), conjecture_kernel::error::StoreError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

const SECONDARY: &str = "secondary";
const VALUE_EXTENSION: &str = "example";
const MAX_SAVE_RETRIES: usize = 3;

/// Identifies the value set belonging to one test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    /// SHA-256 of the test identity.
    pub primary_hash: [u8; 32],
    pub sub_key: Option<String>,
}

impl StoreKey {
    /// Derives a key from a stable description of the test, normally its
    /// declared shape rather than its name.
    pub fn from_identity(identity: &[u8]) -> Self {
        StoreKey {
            primary_hash: Sha256::digest(identity).into(),
            sub_key: None,
        }
    }

    pub fn with_sub_key(&self, sub_key: &str) -> Self {
        StoreKey {
            primary_hash: self.primary_hash,
            sub_key: Some(sub_key.to_string()),
        }
    }

    /// The key of this test's secondary corpus.
    pub fn secondary(&self) -> Self {
        self.with_sub_key(SECONDARY)
    }

    pub fn to_hex(&self) -> String {
        let primary_hex = hex::encode(self.primary_hash);
        match &self.sub_key {
            Some(sub) => format!("{}.{}", primary_hex, sub),
            None => primary_hex,
        }
    }

    pub fn from_hex(hex_str: &str) -> StoreResult<Self> {
        let (primary_hex, sub_key) = match hex_str.split_once('.') {
            Some((primary, sub)) => (primary, Some(sub.to_string())),
            None => (hex_str, None),
        };
        if primary_hex.len() != 64 {
            return Err(StoreError::InvalidKey(format!(
                "invalid primary key length: {}",
                primary_hex.len()
            )));
        }
        let mut primary_hash = [0u8; 32];
        hex::decode_to_slice(primary_hex, &mut primary_hash)
            .map_err(|e| StoreError::InvalidKey(format!("invalid hex: {}", e)))?;
        Ok(StoreKey {
            primary_hash,
            sub_key,
        })
    }
}

pub trait ExampleStore: Send + Sync {
    /// Adds `value` to the set under `key`. Saving a value twice is a no-op.
    fn save(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()>;

    /// All values currently stored under `key`, in no particular order.
    fn fetch(&self, key: &StoreKey) -> StoreResult<Vec<Vec<u8>>>;

    /// Removes `value` from the set under `key`. Deleting a missing value is a no-op.
    fn delete(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()>;

    fn move_value(&self, src: &StoreKey, dest: &StoreKey, value: &[u8]) -> StoreResult<()> {
        self.save(dest, value)?;
        self.delete(src, value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<StoreKey, HashSet<Vec<u8>>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn key_count(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn example_count(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashSet::len)
            .sum()
    }
}

impl ExampleStore for InMemoryStore {
    fn save(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.entry(key.clone()).or_default().insert(value.to_vec());
        Ok(())
    }

    fn fetch(&self, key: &StoreKey) -> StoreResult<Vec<Vec<u8>>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = data.get_mut(key) {
            set.remove(value);
            if set.is_empty() {
                data.remove(key);
            }
        }
        Ok(())
    }
}

/// File-backed store: `<base>/<key hex>/<value digest>.example`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    base_path: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> StoreResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(DirectoryStore { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_dir(&self, key: &StoreKey) -> StoreResult<PathBuf> {
        if let Some(sub) = &key.sub_key {
            let safe = !sub.is_empty()
                && sub
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
                && !sub.contains("..");
            if !safe {
                return Err(StoreError::InvalidKey(format!(
                    "sub-key {:?} cannot be used as a directory name",
                    sub
                )));
            }
        }
        Ok(self.base_path.join(key.to_hex()))
    }

    fn value_path(key_dir: &Path, value: &[u8]) -> PathBuf {
        let digest = Sha256::digest(value);
        key_dir.join(format!("{}.{}", hex::encode(&digest[..16]), VALUE_EXTENSION))
    }

    /// Writes `value` to a temporary file beside `path` and persists it over
    /// `path`. `persist` renames over an existing file atomically on POSIX
    /// and uses a replacing move on Windows.
    fn atomic_write(key_dir: &Path, path: &Path, value: &[u8]) -> io::Result<()> {
        let mut file = NamedTempFile::new_in(key_dir)?;
        file.write_all(value)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ExampleStore for DirectoryStore {
    fn save(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let key_dir = self.key_dir(key)?;
        let path = Self::value_path(&key_dir, value);
        if path.exists() {
            return Ok(());
        }
        // A concurrent delete may remove the (empty) key directory between
        // creating it and creating the temp file.
        let mut retries = 0;
        loop {
            fs::create_dir_all(&key_dir)?;
            match Self::atomic_write(&key_dir, &path, value) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound && retries < MAX_SAVE_RETRIES => {
                    retries += 1
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!("saved {} byte example under {}", value.len(), key.to_hex());
        Ok(())
    }

    fn fetch(&self, key: &StoreKey) -> StoreResult<Vec<Vec<u8>>> {
        let key_dir = self.key_dir(key)?;
        let entries = match fs::read_dir(&key_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut values = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if path.extension().map_or(true, |ext| ext != VALUE_EXTENSION) {
                continue;
            }
            match fs::read(&path) {
                Ok(value) => values.push(value),
                // Deleted by another process since the listing.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => warn!("skipping unreadable example {}: {}", path.display(), e),
            }
        }
        Ok(values)
    }

    fn delete(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let key_dir = self.key_dir(key)?;
        match fs::remove_file(Self::value_path(&key_dir, value)) {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // Fails harmlessly if the directory is not empty or already gone.
        let _ = fs::remove_dir(&key_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sorted(mut values: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        values.sort();
        values
    }

    #[test]
    fn key_hex_round_trips_with_sub_key() {
        let key = StoreKey::from_identity(b"integers");
        assert_eq!(StoreKey::from_hex(&key.to_hex()).unwrap(), key);
        let secondary = key.secondary();
        assert!(secondary.to_hex().ends_with(".secondary"));
        assert_eq!(StoreKey::from_hex(&secondary.to_hex()).unwrap(), secondary);
        assert!(StoreKey::from_hex("abc").is_err());
        assert!(StoreKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn identity_determines_key() {
        assert_eq!(StoreKey::from_identity(b"a"), StoreKey::from_identity(b"a"));
        assert_ne!(StoreKey::from_identity(b"a"), StoreKey::from_identity(b"b"));
    }

    #[test]
    fn in_memory_store_is_a_set_per_key() {
        let store = InMemoryStore::new();
        let key = StoreKey::from_identity(b"t");
        store.save(&key, &[1, 2]).unwrap();
        store.save(&key, &[1, 2]).unwrap();
        store.save(&key, &[3]).unwrap();
        assert_eq!(sorted(store.fetch(&key).unwrap()), vec![vec![1, 2], vec![3]]);
        assert!(store.fetch(&key.secondary()).unwrap().is_empty());

        store.delete(&key, &[1, 2]).unwrap();
        store.delete(&key, &[9]).unwrap();
        assert_eq!(store.fetch(&key).unwrap(), vec![vec![3]]);
        store.delete(&key, &[3]).unwrap();
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn move_value_changes_key() {
        let store = InMemoryStore::new();
        let key = StoreKey::from_identity(b"t");
        store.save(&key, &[5]).unwrap();
        store.move_value(&key, &key.secondary(), &[5]).unwrap();
        assert!(store.fetch(&key).unwrap().is_empty());
        assert_eq!(store.fetch(&key.secondary()).unwrap(), vec![vec![5]]);
        assert_eq!(store.example_count(), 1);
    }

    #[test]
    fn directory_store_persists_across_handles() {
        let dir = tempdir().unwrap();
        let key = StoreKey::from_identity(b"t");
        {
            let store = DirectoryStore::new(dir.path()).unwrap();
            store.save(&key, &[1, 0, 1, 0, 0]).unwrap();
            store.save(&key, &[]).unwrap();
            store.save(&key.secondary(), &[7]).unwrap();
        }
        let store = DirectoryStore::new(dir.path()).unwrap();
        assert_eq!(
            sorted(store.fetch(&key).unwrap()),
            vec![vec![], vec![1, 0, 1, 0, 0]]
        );
        assert_eq!(store.fetch(&key.secondary()).unwrap(), vec![vec![7]]);
    }

    #[test]
    fn directory_store_delete_is_idempotent_and_cleans_up() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path()).unwrap();
        let key = StoreKey::from_identity(b"t");
        store.save(&key, &[4]).unwrap();
        store.delete(&key, &[4]).unwrap();
        store.delete(&key, &[4]).unwrap();
        assert!(store.fetch(&key).unwrap().is_empty());
        assert!(!dir.path().join(key.to_hex()).exists());
    }

    #[test]
    fn directory_store_ignores_stray_files() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path()).unwrap();
        let key = StoreKey::from_identity(b"t");
        store.save(&key, &[1]).unwrap();
        fs::write(dir.path().join(key.to_hex()).join(".tmpAbCd"), b"partial").unwrap();
        assert_eq!(store.fetch(&key).unwrap(), vec![vec![1]]);
    }

    #[test]
    fn directory_store_rejects_path_like_sub_keys() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path()).unwrap();
        let key = StoreKey::from_identity(b"t").with_sub_key("../escape");
        assert!(matches!(store.save(&key, &[1]), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn concurrent_writers_do_not_corrupt_values() {
        let dir = tempdir().unwrap();
        let key = StoreKey::from_identity(b"shared");
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = DirectoryStore::new(dir.path()).unwrap();
                let key = key.clone();
                std::thread::spawn(move || {
                    for round in 0..20u8 {
                        let value = vec![i; 64 + round as usize];
                        store.save(&key, &value).unwrap();
                        if round % 2 == 0 {
                            store.delete(&key, &value).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let store = DirectoryStore::new(dir.path()).unwrap();
        let values = store.fetch(&key).unwrap();
        assert_eq!(values.len(), 8 * 10);
        for value in values {
            assert!(value.iter().all(|&b| b == value[0]));
        }
    }
}
