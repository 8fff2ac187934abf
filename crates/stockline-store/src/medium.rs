//! # Storage Medium
//!
//! The seam to the platform-owned blob store. The layer persists exactly two
//! kinds of key - one per collection and one for the sync queue - and reads
//! and writes each as a single atomic blob.
//!
//! Implementations must guarantee that a `write` either lands completely or
//! not at all: a reader must never see a torn blob. [`FileMedium`] gets this
//! from the classic temp-file-then-rename dance; [`MemoryMedium`] is
//! trivially atomic under its lock.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the backing medium.
#[derive(Debug, Error)]
pub enum MediumError {
    /// The medium refused the write for capacity reasons.
    #[error("storage medium is full")]
    Full,

    /// Any other I/O failure.
    #[error("storage I/O failed: {0}")]
    Io(String),
}

/// Atomic whole-blob storage, keyed by string.
pub trait StorageMedium: Send + Sync {
    /// Reads the blob at `key`, or `None` if it was never written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError>;

    /// Atomically replaces the blob at `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError>;

    /// Removes the blob at `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), MediumError>;
}

// =============================================================================
// Memory Medium
// =============================================================================

/// In-memory medium for tests and ephemeral stores.
///
/// An optional byte capacity makes the `StorageFull` path testable.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    capacity: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        MemoryMedium::default()
    }

    /// A medium that rejects writes once total stored bytes would exceed
    /// `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        MemoryMedium {
            blobs: Mutex::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }
}

impl StorageMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        let blobs = self.blobs.lock().expect("medium mutex poisoned");
        Ok(blobs.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError> {
        let mut blobs = self.blobs.lock().expect("medium mutex poisoned");

        if let Some(capacity) = self.capacity {
            let others: usize = blobs
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + bytes.len() > capacity {
                return Err(MediumError::Full);
            }
        }

        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MediumError> {
        let mut blobs = self.blobs.lock().expect("medium mutex poisoned");
        blobs.remove(key);
        Ok(())
    }
}

// =============================================================================
// File Medium
// =============================================================================

/// File-backed medium: one `<key>.json` file per blob in a single directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write leaves the previous blob intact.
#[derive(Debug)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Opens a medium rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| MediumError::Io(e.to_string()))?;
        Ok(FileMedium { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediumError::Io(e.to_string())),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));

        let mut file = fs::File::create(&tmp).map_err(|e| MediumError::Io(e.to_string()))?;
        file.write_all(bytes).map_err(map_write_err)?;
        file.sync_all().map_err(|e| MediumError::Io(e.to_string()))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| MediumError::Io(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MediumError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediumError::Io(e.to_string())),
        }
    }
}

fn map_write_err(e: std::io::Error) -> MediumError {
    // ENOSPC surfaces as a capacity rejection, everything else as plain I/O
    if e.raw_os_error() == Some(28) {
        MediumError::Full
    } else {
        MediumError::Io(e.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
