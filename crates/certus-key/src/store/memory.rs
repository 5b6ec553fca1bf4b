use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use super::{KeyHandle, KeyMetadata, KeyStore};
use crate::error::{Error, Result};

type KeyStorage = Arc<RwLock<HashMap<KeyHandle, (KeyMetadata, Vec<u8>)>>>;

/// In-memory key store
pub struct MemoryKeyStore {
    keys: KeyStorage,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn store_key(&self, metadata: KeyMetadata, pkcs8_der: Vec<u8>) -> Result<()> {
        let mut keys = self.keys.write().map_err(|_| Error::lock_poisoned())?;

        if keys.contains_key(&metadata.handle) {
            return Err(Error::key_exists(&metadata.handle));
        }

        keys.insert(metadata.handle.clone(), (metadata, pkcs8_der));
        Ok(())
    }

    fn get_key(&self, handle: &KeyHandle) -> Result<(KeyMetadata, Vec<u8>)> {
        let keys = self.keys.read().map_err(|_| Error::lock_poisoned())?;

        keys.get(handle)
            .cloned()
            .ok_or_else(|| Error::key_not_found(handle))
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        let mut keys = self.keys.write().map_err(|_| Error::lock_poisoned())?;

        keys.remove(handle)
            .ok_or_else(|| Error::key_not_found(handle))
            .map(|_| ())
    }

    fn list_keys(&self) -> Result<Vec<KeyHandle>> {
        let keys = self.keys.read().map_err(|_| Error::lock_poisoned())?;

        let mut handles: Vec<KeyHandle> = keys.keys().cloned().collect();
        handles.sort();
        Ok(handles)
    }

    fn exists(&self, handle: &KeyHandle) -> Result<bool> {
        let keys = self.keys.read().map_err(|_| Error::lock_poisoned())?;
        Ok(keys.contains_key(handle))
    }
}
