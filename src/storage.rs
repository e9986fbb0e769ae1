//! Shared-key persistence.
//!
//! A single-slot save/retrieve/erase interface. The negotiated shared key
//! is the one piece of state that survives process restarts: it is written
//! only after a verified handshake response and read only to skip the
//! handshake on a fresh connection. Where the key actually lives (keychain,
//! encrypted file, test memory) is the host application's choice.

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;
use zeroize::Zeroizing;

/// Errors from key storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading the stored key failed
    #[error("Reading the shared key failed: {0}")]
    Retrieve(String),

    /// Writing the key failed
    #[error("Writing the shared key failed: {0}")]
    Save(String),

    /// Erasing the key failed
    #[error("Erasing the shared key failed: {0}")]
    Erase(String),
}

/// Single-slot persistent storage for the shared key.
pub trait SharedKeyStore: Send {
    /// Persist the key, replacing any previous one
    fn save(&mut self, key: &[u8]) -> Result<(), StorageError>;

    /// Retrieve the stored key, `None` if the slot is empty
    fn retrieve(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Erase the stored key. Succeeds if the slot is already empty.
    fn erase(&mut self) -> Result<(), StorageError>;
}

/// Non-persistent store for tests and ephemeral embeddings.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    key: Option<Zeroizing<Vec<u8>>>,
}

impl InMemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedKeyStore for InMemoryKeyStore {
    fn save(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.key = Some(Zeroizing::new(key.to_vec()));
        Ok(())
    }

    fn retrieve(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.key.as_ref().map(|k| k.to_vec()))
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.key = None;
        Ok(())
    }
}

/// File-backed store.
///
/// Stores the raw key bytes in a single file, created owner-readable only
/// on Unix. Suitable where no platform keychain is available.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SharedKeyStore for FileKeyStore {
    fn save(&mut self, key: &[u8]) -> Result<(), StorageError> {
        std::fs::write(&self.path, key).map_err(|e| StorageError::Save(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| StorageError::Save(e.to_string()))?;
        }

        Ok(())
    }

    fn retrieve(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Retrieve(e.to_string())),
        }
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Erase(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_slot() {
        let mut store = InMemoryKeyStore::new();
        assert_eq!(store.retrieve().unwrap(), None);

        store.save(&[1, 2, 3]).unwrap();
        assert_eq!(store.retrieve().unwrap(), Some(vec![1, 2, 3]));

        // Save replaces
        store.save(&[4, 5]).unwrap();
        assert_eq!(store.retrieve().unwrap(), Some(vec![4, 5]));

        store.erase().unwrap();
        assert_eq!(store.retrieve().unwrap(), None);
        // Erasing an empty slot is fine
        store.erase().unwrap();
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileKeyStore::new(dir.path().join("shared.key"));

        assert_eq!(store.retrieve().unwrap(), None);

        store.save(&[0xAB; 64]).unwrap();
        assert_eq!(store.retrieve().unwrap(), Some(vec![0xAB; 64]));

        store.erase().unwrap();
        assert_eq!(store.retrieve().unwrap(), None);
        store.erase().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.key");
        let mut store = FileKeyStore::new(&path);
        store.save(&[0u8; 64]).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
