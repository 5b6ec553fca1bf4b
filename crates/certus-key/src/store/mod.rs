mod file;
mod memory;

use std::{fmt, path::PathBuf, sync::Arc};

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    algorithm::Algorithm,
    error::{Error, Result},
};

/// Name a key is stored under.
///
/// Restricted to `[A-Za-z0-9_-]` so it can double as a file name.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(handle: impl Into<String>) -> Result<Self> {
        let handle = handle.into();
        let well_formed = !handle.is_empty()
            && handle.len() <= 128
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(Error::KeyError(format!("invalid key handle: {handle:?}")));
        }
        Ok(Self(handle))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyHandle {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<KeyHandle> for String {
    fn from(handle: KeyHandle) -> Self {
        handle.0
    }
}

/// Key metadata stored alongside the key material
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub handle: KeyHandle,
    pub algorithm: Algorithm,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub label: Option<String>,
}

impl KeyMetadata {
    pub fn new(handle: KeyHandle, algorithm: Algorithm, label: Option<String>) -> Self {
        Self {
            handle,
            algorithm,
            created_at: OffsetDateTime::now_utc(),
            label,
        }
    }
}

/// Storage backend for PKCS#8 DER private keys (synchronous)
pub trait KeyStore: Send + Sync {
    /// Store a key; fails with [`Error::KeyExists`] if the handle is taken
    fn store_key(&self, metadata: KeyMetadata, pkcs8_der: Vec<u8>) -> Result<()>;

    /// Retrieve a key; fails with [`Error::KeyUnavailable`] if absent
    fn get_key(&self, handle: &KeyHandle) -> Result<(KeyMetadata, Vec<u8>)>;

    fn delete_key(&self, handle: &KeyHandle) -> Result<()>;

    /// All handles, sorted
    fn list_keys(&self) -> Result<Vec<KeyHandle>>;

    fn exists(&self, handle: &KeyHandle) -> Result<bool>;
}

/// Key storage configuration
#[derive(Clone, Debug)]
pub enum KeyStoreConfig {
    Memory,
    File {
        path: PathBuf,
        encryption_key: Option<Vec<u8>>,
    },
}

/// Build a key store from configuration
pub fn create_key_store(config: KeyStoreConfig) -> Result<Arc<dyn KeyStore>> {
    match config {
        KeyStoreConfig::Memory => Ok(Arc::new(MemoryKeyStore::new())),
        KeyStoreConfig::File {
            path,
            encryption_key,
        } => Ok(Arc::new(FileKeyStore::new(path, encryption_key)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_path_components() {
        assert!(KeyHandle::new("ca-root-1").is_ok());
        assert!(KeyHandle::new("0a1b2c").is_ok());
        assert!(KeyHandle::new("../etc/passwd").is_err());
        assert!(KeyHandle::new("").is_err());
    }

    #[test]
    fn test_handle_serde_validates() {
        let handle: KeyHandle = serde_json::from_str("\"abc_1\"").unwrap();
        assert_eq!(handle.as_str(), "abc_1");
        assert!(serde_json::from_str::<KeyHandle>("\"a/b\"").is_err());
    }

    #[test]
    fn test_create_key_store() {
        let handle = KeyHandle::new("factory").unwrap();
        let metadata = KeyMetadata::new(handle.clone(), Algorithm::Ed25519, None);

        let memory = create_key_store(KeyStoreConfig::Memory).unwrap();
        memory.store_key(metadata.clone(), vec![1, 2, 3]).unwrap();
        assert!(memory.exists(&handle).unwrap());

        let dir = tempfile::TempDir::new().unwrap();
        let file = create_key_store(KeyStoreConfig::File {
            path: dir.path().join("keys"),
            encryption_key: Some(vec![5u8; 32]),
        })
        .unwrap();
        file.store_key(metadata, vec![4, 5, 6]).unwrap();
        assert_eq!(file.get_key(&handle).unwrap().1, vec![4, 5, 6]);
        assert!(dir.path().join("keys").join("factory.key").exists());

        assert!(create_key_store(KeyStoreConfig::File {
            path: dir.path().join("short"),
            encryption_key: Some(vec![0u8; 16]),
        })
        .is_err());
    }
}
