use crate::error::StoreError;
use crate::index::ReverseMapIndex;
use glyphstore_codec::ObjectHash;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const ID_HASH_CACHE_CAPACITY: usize = 500;

/// Outcome of [`ObjectStore::put`] (§4.3 "put(bytes) -> {hash, status}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Created,
    Exists,
}

#[derive(Debug, Clone, Copy)]
pub struct PutResult {
    pub hash: ObjectHash,
    pub status: PutStatus,
}

/// A content-addressed, write-once file store with crash-safe writes
/// (temp file + atomic rename), a reverse-map index, and an ID-hash cache
/// (§4.3).
pub struct ObjectStore {
    root: PathBuf,
    index: ReverseMapIndex,
    id_cache: Mutex<LruCache<ObjectHash, Option<ObjectHash>>>,
}

impl ObjectStore {
    /// Opens (creating if necessary) a store rooted at `root`, with its
    /// reverse-map index backed by the given sled database.
    pub fn open(root: impl Into<PathBuf>, db: &sled::Db) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self {
            root,
            index: ReverseMapIndex::open(db)?,
            id_cache: Mutex::new(LruCache::new(NonZeroUsize::new(ID_HASH_CACHE_CAPACITY).unwrap())),
        })
    }

    fn path_for(&self, hash: &ObjectHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex)
    }

    /// Writes `bytes`, returning the content hash; idempotent (§4.3).
    pub fn put(&self, bytes: &[u8]) -> Result<PutResult, StoreError> {
        let hash = ObjectHash::of(bytes);
        let path = self.path_for(&hash);
        if path.exists() {
            return Ok(PutResult {
                hash,
                status: PutStatus::Exists,
            });
        }
        self.write_atomic(&path, bytes)?;
        Ok(PutResult {
            hash,
            status: PutStatus::Created,
        })
    }

    /// Writes a CLOB, rejecting content that is not valid UTF-8 (§4.3).
    pub fn put_clob(&self, bytes: &[u8]) -> Result<PutResult, StoreError> {
        std::str::from_utf8(bytes).map_err(|_| StoreError::NotUtf8)?;
        self.put(bytes)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.root.join("tmp").join(format!("{:x}", rand_suffix()));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Reads and verifies an object's content hash (§4.3).
    pub fn get(&self, hash: &ObjectHash) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(hash);
        let mut file = File::open(&path).map_err(|_| StoreError::NotFound(*hash))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let computed = ObjectHash::of(&bytes);
        if computed != *hash {
            return Err(StoreError::HashMismatch { hash: *hash, computed });
        }
        Ok(bytes)
    }

    pub fn exists(&self, hash: &ObjectHash) -> bool {
        self.path_for(hash).exists()
    }

    pub fn size(&self, hash: &ObjectHash) -> Result<u64, StoreError> {
        let path = self.path_for(hash);
        let meta = fs::metadata(&path).map_err(|_| StoreError::NotFound(*hash))?;
        Ok(meta.len())
    }

    /// Opens a reader for streamed access; content hash is *not* re-verified
    /// per chunk, only on open (the caller owns a consistent file handle).
    pub fn stream_read(&self, hash: &ObjectHash) -> Result<File, StoreError> {
        File::open(self.path_for(hash)).map_err(|_| StoreError::NotFound(*hash))
    }

    /// Begins a streamed write; call [`StagedWriter::finish`] to hash and
    /// atomically install the content.
    pub fn stream_write(&self) -> Result<StagedWriter<'_>, StoreError> {
        let tmp_path = self.root.join("tmp").join(format!("{:x}", rand_suffix()));
        let file = File::create(&tmp_path)?;
        Ok(StagedWriter {
            store: self,
            tmp_path,
            file,
        })
    }

    /// Records that `referencing` points at `target` as a field of type
    /// `target_type`, as part of the same logical write as the referencing
    /// object (§4.3 reverse-map index).
    pub fn record_reference(
        &self,
        target: &ObjectHash,
        target_type: &str,
        referencing: &ObjectHash,
    ) -> Result<(), StoreError> {
        self.index.record(target, target_type, referencing)
    }

    /// Lists every object of `target_type` known to reference `target`.
    pub fn reverse_map(&self, target: &ObjectHash, target_type: &str) -> Result<Vec<ObjectHash>, StoreError> {
        self.index.list(target, target_type)
    }

    /// Looks up the ID-hash for `hash`, consulting the LRU cache first and
    /// falling back to `compute` (which parses the stored microdata) on miss
    /// (§4.3 "ID-hash cache").
    pub fn id_hash_of(
        &self,
        hash: ObjectHash,
        compute: impl FnOnce() -> Result<Option<ObjectHash>, StoreError>,
    ) -> Result<Option<ObjectHash>, StoreError> {
        if let Some(cached) = self.id_cache.lock().get(&hash).copied() {
            return Ok(cached);
        }
        let computed = compute()?;
        self.id_cache.lock().put(hash, computed);
        Ok(computed)
    }

    /// Populates the ID-hash cache eagerly on write.
    pub fn cache_id_hash(&self, hash: ObjectHash, id_hash: Option<ObjectHash>) {
        self.id_cache.lock().put(hash, id_hash);
    }
}

/// A staged write that finalizes to its content hash on [`finish`](Self::finish).
pub struct StagedWriter<'a> {
    store: &'a ObjectStore,
    tmp_path: PathBuf,
    file: File,
}

impl<'a> StagedWriter<'a> {
    pub fn write_all(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.file.write_all(chunk)?;
        Ok(())
    }

    pub fn finish(self) -> Result<PutResult, StoreError> {
        self.file.sync_all()?;
        drop(self.file);
        let bytes = fs::read(&self.tmp_path)?;
        let hash = ObjectHash::of(&bytes);
        let final_path = self.store.path_for(&hash);
        if final_path.exists() {
            fs::remove_file(&self.tmp_path)?;
            return Ok(PutResult {
                hash,
                status: PutStatus::Exists,
            });
        }
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.tmp_path, &final_path)?;
        Ok(PutResult {
            hash,
            status: PutStatus::Created,
        })
    }
}

fn rand_suffix() -> u128 {
    let mut buf = [0u8; 16];
    getrandom::getrandom(&mut buf).expect("getrandom");
    u128::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ObjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = ObjectStore::open(dir.path(), &db).unwrap();
        (store, dir)
    }

    #[test]
    fn put_is_idempotent() {
        let (store, _dir) = store();
        let a = store.put(b"hello").unwrap();
        let b = store.put(b"hello").unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.status, PutStatus::Created);
        assert_eq!(b.status, PutStatus::Exists);
    }

    #[test]
    fn get_verifies_hash_and_missing_is_not_found() {
        let (store, _dir) = store();
        let result = store.put(b"world").unwrap();
        assert_eq!(store.get(&result.hash).unwrap(), b"world");
        let missing = ObjectHash::of(b"nonexistent");
        assert!(matches!(store.get(&missing), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn clob_rejects_non_utf8() {
        let (store, _dir) = store();
        let bad = vec![0xff, 0xfe, 0xfd];
        assert!(matches!(store.put_clob(&bad), Err(StoreError::NotUtf8)));
    }

    #[test]
    fn stream_write_finalizes_to_content_hash() {
        let (store, _dir) = store();
        let mut writer = store.stream_write().unwrap();
        writer.write_all(b"chunk-one-").unwrap();
        writer.write_all(b"chunk-two").unwrap();
        let result = writer.finish().unwrap();
        assert_eq!(store.get(&result.hash).unwrap(), b"chunk-one-chunk-two");
    }

    #[test]
    fn reverse_map_lists_referencing_objects() {
        let (store, _dir) = store();
        let target = ObjectHash::of(b"target");
        let a = ObjectHash::of(b"a");
        let b = ObjectHash::of(b"b");
        store.record_reference(&target, "Note", &a).unwrap();
        store.record_reference(&target, "Note", &b).unwrap();
        let mut refs = store.reverse_map(&target, "Note").unwrap();
        refs.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(refs, expected);
    }

    #[test]
    fn id_hash_cache_roundtrip() {
        let (store, _dir) = store();
        let hash = ObjectHash::of(b"versioned");
        let id_hash = ObjectHash::of(b"id-object");
        let mut calls = 0;
        let first = store
            .id_hash_of(hash, || {
                calls += 1;
                Ok(Some(id_hash))
            })
            .unwrap();
        assert_eq!(first, Some(id_hash));
        let second = store.id_hash_of(hash, || unreachable!("should hit cache")).unwrap();
        assert_eq!(second, Some(id_hash));
        assert_eq!(calls, 1);
    }
}
