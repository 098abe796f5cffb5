//! Cache entry storage.

use super::{CacheEntry, Fingerprint};
use dashmap::DashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Persists cache entries by fingerprint.
///
/// Stores only ever see whole entries: a `put` supersedes the previous entry
/// for the same fingerprint. Eviction is the store's own business.
pub trait CacheStore: Send + Sync {
    /// Returns the entry stored for `fingerprint`, if any.
    fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<CacheEntry>>;

    /// Stores `entry`, replacing any previous entry with the same fingerprint.
    fn put(&self, entry: CacheEntry) -> io::Result<()>;
}

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<Fingerprint, CacheEntry>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<CacheEntry>> {
        Ok(self.entries.get(fingerprint).map(|entry| entry.value().clone()))
    }

    fn put(&self, entry: CacheEntry) -> io::Result<()> {
        self.entries.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }
}

/// A store keeping one JSON file per entry in a directory.
///
/// Files are named after the SHA-256 digest of the fingerprint. Writes go to a
/// temporary file first and are renamed into place, so readers never observe
/// a half-written entry.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory entries are kept in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.json", fingerprint.digest()))
    }
}

impl CacheStore for FileStore {
    fn get(&self, fingerprint: &Fingerprint) -> io::Result<Option<CacheEntry>> {
        let bytes = match fs::read(self.path_for(fingerprint)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        // Digest collisions are not worth more than a miss.
        if entry.fingerprint != *fingerprint {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn put(&self, entry: CacheEntry) -> io::Result<()> {
        let path = self.path_for(&entry.fingerprint);
        let bytes = serde_json::to_vec(&entry).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        let temporary = self
            .root
            .join(format!(".{}.{:016x}.tmp", entry.fingerprint.digest(), rand::random::<u64>()));
        if let Err(e) = fs::write(&temporary, bytes).and_then(|()| fs::rename(&temporary, &path)) {
            let _ = fs::remove_file(&temporary);
            return Err(e);
        }

        tracing::trace!(path = %path.display(), "Stored cache entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn entry(key: &str, value: &[u8]) -> CacheEntry {
        CacheEntry::new(
            Fingerprint::from_key(key),
            SystemTime::UNIX_EPOCH + Duration::from_secs(10),
            value.to_vec(),
        )
    }

    #[test]
    fn test_memory_store_supersedes_entries() {
        let store = MemoryStore::new();
        let key = Fingerprint::from_key("GET https://example.com/a");
        assert!(store.get(&key).unwrap().is_none());

        store.put(entry("GET https://example.com/a", b"1")).unwrap();
        store.put(entry("GET https://example.com/a", b"2")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().unwrap().value, b"2");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache")).unwrap();
        let key = Fingerprint::from_key("GET https://example.com/a");

        assert!(store.get(&key).unwrap().is_none());
        store.put(entry("GET https://example.com/a", b"{\"id\":1}")).unwrap();

        let stored = store.get(&key).unwrap().unwrap();
        assert_eq!(stored.value, b"{\"id\":1}");
        assert_eq!(stored.stored_at, SystemTime::UNIX_EPOCH + Duration::from_secs(10));

        // Only the final file remains.
        let files: Vec<_> = fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_file_store_reopens_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path())
            .unwrap()
            .put(entry("GET https://example.com/a", b"v"))
            .unwrap();

        let reopened = FileStore::new(dir.path()).unwrap();
        let key = Fingerprint::from_key("GET https://example.com/a");
        assert_eq!(reopened.get(&key).unwrap().unwrap().value, b"v");
    }

    #[test]
    fn test_file_store_failed_put_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key = Fingerprint::from_key("GET https://example.com/a");

        // A non-empty directory in place of the entry makes the rename fail.
        let blocker = store.path_for(&key);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(store.put(entry("GET https://example.com/a", b"v")).is_err());

        let leftovers: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
    }

    #[test]
    fn test_file_store_reports_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key = Fingerprint::from_key("GET https://example.com/a");
        fs::write(store.path_for(&key), b"not json").unwrap();

        let error = store.get(&key).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }
}
