//! Persistent storage reader used once at startup to populate the golden store

use crate::error::StorageError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Minimal open/read/close contract over named resources
pub trait Storage {
    /// Open resource handle
    type Handle;

    /// Open a named resource for reading
    fn open(&mut self, name: &str) -> Result<Self::Handle, StorageError>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means end of resource
    fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Release a handle
    fn close(&mut self, handle: Self::Handle) -> Result<(), StorageError>;
}

/// Read a whole resource through the open/read/close contract.
///
/// At most `limit` bytes are kept; one extra byte is probed so that an
/// oversized resource is still detected by the caller's length check.
pub fn read_resource<S: Storage>(
    storage: &mut S,
    name: &str,
    limit: usize,
) -> Result<Vec<u8>, StorageError> {
    let mut handle = storage.open(name)?;
    let mut data = Vec::with_capacity(limit);
    let mut chunk = [0u8; 64 * 1024];

    loop {
        let room = (limit + 1).saturating_sub(data.len());
        if room == 0 {
            break;
        }
        let want = room.min(chunk.len());
        let n = match storage.read(&mut handle, &mut chunk[..want]) {
            Ok(n) => n,
            Err(e) => {
                // Read error wins over close error
                let _ = storage.close(handle);
                return Err(e);
            }
        };
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    storage.close(handle)?;
    Ok(data)
}

/// Storage backed by a directory acting as the mounted partition
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

/// Open file plus its name for error reporting
#[derive(Debug)]
pub struct FsHandle {
    name: String,
    file: File,
}

impl FsStorage {
    /// Mount a directory; fails when it is missing or not a directory
    pub fn mount(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        let meta = std::fs::metadata(&root)
            .map_err(|_| StorageError::PartitionMissing(root.display().to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::Mount {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        tracing::debug!("Mounted storage root {:?}", root);
        Ok(Self { root })
    }

    /// Full path of a named resource
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for FsStorage {
    type Handle = FsHandle;

    fn open(&mut self, name: &str) -> Result<FsHandle, StorageError> {
        let file = File::open(self.path_of(name)).map_err(|source| StorageError::Open {
            name: name.to_string(),
            source,
        })?;
        Ok(FsHandle { name: name.to_string(), file })
    }

    fn read(&mut self, handle: &mut FsHandle, buf: &mut [u8]) -> Result<usize, StorageError> {
        loop {
            match handle.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StorageError::Read { name: handle.name.clone(), source })
                }
            }
        }
    }

    fn close(&mut self, handle: FsHandle) -> Result<(), StorageError> {
        drop(handle.file);
        Ok(())
    }
}

/// In-memory storage, for tests and for golden sets built on the fly
#[derive(Debug, Default, Clone)]
pub struct MemStorage {
    files: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.files.insert(name.into(), data);
    }

    /// Builder-style [`MemStorage::insert`]
    pub fn with(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(name, data);
        self
    }
}

impl Storage for MemStorage {
    type Handle = Cursor<Vec<u8>>;

    fn open(&mut self, name: &str) -> Result<Self::Handle, StorageError> {
        self.files
            .get(name)
            .map(|data| Cursor::new(data.clone()))
            .ok_or_else(|| StorageError::Open {
                name: name.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }

    fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize, StorageError> {
        handle.read(buf).map_err(|source| StorageError::Read {
            name: "<memory>".to_string(),
            source,
        })
    }

    fn close(&mut self, _handle: Self::Handle) -> Result<(), StorageError> {
        Ok(())
    }
}
