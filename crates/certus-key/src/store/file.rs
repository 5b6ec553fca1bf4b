use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};

use super::{KeyHandle, KeyMetadata, KeyStore};
use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// File-based key store with optional at-rest encryption.
///
/// Each key is written as `<handle>.key` (PKCS#8 DER, nonce-prefixed
/// ChaCha20-Poly1305 ciphertext when a key is configured) next to a
/// `<handle>.json` metadata file.
pub struct FileKeyStore {
    path: PathBuf,
    cipher: Option<ChaCha20Poly1305>,
    lock: Arc<RwLock<()>>,
}

impl FileKeyStore {
    pub fn new(path: PathBuf, encryption_key: Option<Vec<u8>>) -> Result<Self> {
        let cipher = match encryption_key {
            Some(key) => {
                if key.len() != 32 {
                    return Err(Error::invalid_configuration(
                        "encryption key must be 32 bytes for ChaCha20-Poly1305",
                    ));
                }
                Some(ChaCha20Poly1305::new_from_slice(&key).map_err(Error::invalid_configuration)?)
            }
            None => None,
        };

        fs::create_dir_all(&path)?;

        Ok(Self {
            path,
            cipher,
            lock: Arc::new(RwLock::new(())),
        })
    }

    fn key_path(&self, handle: &KeyHandle) -> PathBuf {
        self.path.join(format!("{handle}.key"))
    }

    fn metadata_path(&self, handle: &KeyHandle) -> PathBuf {
        self.path.join(format!("{handle}.json"))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_vec());
        };

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(Error::encryption)?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(sealed.to_vec());
        };

        if sealed.len() < NONCE_LEN {
            return Err(Error::decryption("ciphertext shorter than nonce"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(Error::decryption)
    }
}

impl KeyStore for FileKeyStore {
    fn store_key(&self, metadata: KeyMetadata, pkcs8_der: Vec<u8>) -> Result<()> {
        let _guard = self.lock.write().map_err(|_| Error::lock_poisoned())?;

        let key_path = self.key_path(&metadata.handle);
        let sealed = self.encrypt(&pkcs8_der)?;

        // create_new doubles as the duplicate check
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&key_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::key_exists(&metadata.handle));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&sealed)?;
        file.sync_all()?;

        let metadata_json = serde_json::to_string_pretty(&metadata)?;
        fs::write(self.metadata_path(&metadata.handle), metadata_json)?;

        tracing::debug!(handle = %metadata.handle, encrypted = self.cipher.is_some(), "stored key");
        Ok(())
    }

    fn get_key(&self, handle: &KeyHandle) -> Result<(KeyMetadata, Vec<u8>)> {
        let _guard = self.lock.read().map_err(|_| Error::lock_poisoned())?;

        let metadata_json = read_stored(&self.metadata_path(handle), handle)?;
        let metadata: KeyMetadata = serde_json::from_slice(&metadata_json)?;

        let sealed = read_stored(&self.key_path(handle), handle)?;
        let pkcs8_der = self.decrypt(&sealed)?;

        Ok((metadata, pkcs8_der))
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        let _guard = self.lock.write().map_err(|_| Error::lock_poisoned())?;

        let key_path = self.key_path(handle);
        if !key_path.exists() {
            return Err(Error::key_not_found(handle));
        }

        fs::remove_file(&key_path)?;
        let metadata_path = self.metadata_path(handle);
        if metadata_path.exists() {
            fs::remove_file(metadata_path)?;
        }
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<KeyHandle>> {
        let _guard = self.lock.read().map_err(|_| Error::lock_poisoned())?;

        let mut handles = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".key")) else {
                continue;
            };
            if let Ok(handle) = KeyHandle::new(stem) {
                handles.push(handle);
            }
        }

        handles.sort();
        Ok(handles)
    }

    fn exists(&self, handle: &KeyHandle) -> Result<bool> {
        let _guard = self.lock.read().map_err(|_| Error::lock_poisoned())?;
        Ok(self.key_path(handle).exists())
    }
}

/// A missing file means no such key; any other failure is a storage fault
fn read_stored(path: &Path, handle: &KeyHandle) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::key_not_found(handle)),
        Err(e) => Err(e.into()),
    }
}
