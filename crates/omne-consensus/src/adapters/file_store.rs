use crate::ports::{BatchOperation, KeyValueStore, ScanResult};
use fs2::FileExt;
use shared_types::KVStoreError;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// File-backed key-value store.
///
/// Keeps the full map in memory and rewrites the file on every mutation
/// (temp file, fsync, rename), so a write is durable once it returns `Ok`.
/// Slashing-protection history is small, which keeps this cheap enough.
///
/// File format: `[key_len:u32][key][value_len:u32][value]...`, little-endian.
///
/// An exclusive lock on `{path}.lock` is held for the lifetime of the store
/// and released on drop. A second process opening the same path fails.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
    _lock: File,
}

impl FileBackedKVStore {
    /// Open (or create) the store at `path`.
    ///
    /// A truncated or otherwise unreadable file is an error rather than an
    /// empty store: losing slashing history silently is not acceptable.
    /// Fails with `Locked` if another handle already owns the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let lock = Self::acquire_lock(&path)?;
        let data = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            info!("[storage] No existing store at {}", path.display());
            BTreeMap::new()
        };

        if !data.is_empty() {
            info!("[storage] Loaded {} keys from {}", data.len(), path.display());
        }

        Ok(Self {
            data,
            path,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn acquire_lock(path: &Path) -> Result<File, KVStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::io_error)?;
        }
        let lock_path = Self::lock_path(path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(Self::io_error)?;
        if file.try_lock_exclusive().is_err() {
            return Err(KVStoreError::Locked {
                path: lock_path.display().to_string(),
            });
        }
        Ok(file)
    }

    fn io_error(e: std::io::Error) -> KVStoreError {
        KVStoreError::IOError {
            message: e.to_string(),
        }
    }

    fn load_from_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let mut file = File::open(path).map_err(Self::io_error)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(Self::io_error)?;

        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < bytes.len() {
            let key = Self::read_chunk(&bytes, &mut cursor)?;
            let value = Self::read_chunk(&bytes, &mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn read_chunk(bytes: &[u8], cursor: &mut usize) -> Result<Vec<u8>, KVStoreError> {
        let corrupt = || KVStoreError::CorruptionError {
            message: format!("truncated record at offset {}", cursor),
        };
        let len_end = cursor.checked_add(4).ok_or_else(corrupt)?;
        let len_bytes: [u8; 4] = bytes
            .get(*cursor..len_end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(corrupt)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let end = len_end.checked_add(len).ok_or_else(corrupt)?;
        let chunk = bytes.get(len_end..end).ok_or_else(corrupt)?.to_vec();
        *cursor = end;
        Ok(chunk)
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::io_error)?;
        }

        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(Self::io_error)?;
        file.write_all(&bytes).map_err(Self::io_error)?;
        file.sync_all().map_err(Self::io_error)?;
        std::fs::rename(&temp_path, &self.path).map_err(Self::io_error)?;
        Ok(())
    }

    /// Apply `ops` and persist; on a failed write the in-memory map is
    /// rolled back so memory never runs ahead of disk.
    fn apply(&mut self, ops: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let snapshot = self.data.clone();
        for op in ops {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        if let Err(e) = self.save_to_file() {
            self.data = snapshot;
            return Err(e);
        }
        Ok(())
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.apply(vec![BatchOperation::put(key.to_vec(), value.to_vec())])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.apply(vec![BatchOperation::delete(key.to_vec())])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.apply(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        let results: Vec<_> = self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }
}
