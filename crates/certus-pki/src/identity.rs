//! CA identity and the key material every signing operation goes through

use std::{
    fmt, fs,
    io::Write,
    path::Path,
    sync::{Arc, RwLock},
};

use certus_key::{Algorithm, KeyHandle, KeyMetadata, KeyPair, KeyStore};
use der::Encode;
use time::Duration;
use tracing::info;

use crate::{
    cert::{x509, Certificate, SignedParts, SubjectName},
    error::{PkiError, Result},
    serial::SerialAllocator,
    types::{now_seconds, KeyOrigin, SerialNumber},
};

/// Which private key an operation should use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRef {
    /// The active CA root key
    CaRoot,
    /// The key generated for an issued certificate
    Certificate(SerialNumber),
}

impl KeyRef {
    fn handle(serial: &SerialNumber) -> Result<KeyHandle> {
        Ok(KeyHandle::new(format!("cert-{serial}"))?)
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRef::CaRoot => f.write_str("ca-root"),
            KeyRef::Certificate(serial) => write!(f, "certificate {serial}"),
        }
    }
}

/// A CA key pair together with its self-signed root certificate
#[derive(Debug)]
pub struct CaIdentity {
    key: KeyPair,
    certificate: Certificate,
}

impl CaIdentity {
    /// Generate a fresh key and self-signed root
    pub fn generate(
        subject: &SubjectName,
        algorithm: Algorithm,
        validity_days: u32,
        serials: &dyn SerialAllocator,
    ) -> Result<Self> {
        let subject = subject.normalized();
        subject.validate()?;

        let key = KeyPair::generate(algorithm)?;
        let spki = key.public_key_der()?;
        let serial = serials.next()?;
        let not_before = now_seconds();

        let tbs = x509::build_tbs(x509::TbsTemplate {
            serial: &serial,
            issuer: &subject,
            subject: &subject,
            not_before,
            not_after: not_before + Duration::days(i64::from(validity_days)),
            subject_public_key: &spki,
            algorithm,
            extensions: x509::ca_extensions(&x509::key_identifier(&spki))?,
        })?;
        let signature = key.sign(&tbs.to_der()?)?;
        let der = x509::assemble(tbs, algorithm, &signature)?;
        let certificate = Certificate::from_der(&der, KeyOrigin::Generated)?;

        info!(
            serial = %certificate.serial_number,
            subject = %certificate.subject,
            %algorithm,
            "generated CA identity"
        );
        Ok(Self { key, certificate })
    }

    /// Pair a key with its root certificate, checking that they belong together
    pub fn from_parts(key: KeyPair, certificate: Certificate) -> Result<Self> {
        if key.public_key_der()? != certificate.public_key {
            return Err(PkiError::InvalidConfiguration(format!(
                "CA key does not match root certificate {}",
                certificate.serial_number
            )));
        }
        Ok(Self { key, certificate })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.certificate.serial_number
    }

    pub fn subject(&self) -> &SubjectName {
        &self.certificate.subject
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    pub fn key_id(&self) -> Vec<u8> {
        self.certificate.key_id()
    }

    pub(crate) fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(bytes)?)
    }

    /// Key store handle the CA key is persisted under
    pub fn key_handle(&self) -> Result<KeyHandle> {
        Ok(KeyHandle::new(format!("ca-{}", self.serial()))?)
    }

    /// Persist: key into `keys`, root certificate as PEM at `pem_path`
    pub fn save(&self, keys: &dyn KeyStore, pem_path: &Path) -> Result<()> {
        let metadata = KeyMetadata::new(
            self.key_handle()?,
            self.algorithm(),
            Some(format!("CA root {}", self.subject().common_name)),
        );
        keys.store_key(metadata, self.key.to_pkcs8_der()?)?;

        write_atomic(pem_path, self.certificate.to_pem().as_bytes())
    }

    /// Load an identity written by [`CaIdentity::save`]
    pub fn load(keys: &dyn KeyStore, pem_path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(pem_path)?;
        let certificate = Certificate::from_pem(&pem, KeyOrigin::Generated)?;
        let handle = KeyHandle::new(format!("ca-{}", certificate.serial_number))?;
        let (_, pkcs8_der) = keys.get_key(&handle)?;
        Self::from_parts(KeyPair::from_pkcs8_der(&pkcs8_der)?, certificate)
    }
}

/// Owner of every private key the CA uses.
///
/// Holds the active [`CaIdentity`], the retired identities kept for
/// verifying what they issued, and the key store with per-certificate keys.
/// Callers pass bytes in and get signatures out; no accessor returns a
/// private key.
pub struct KeyMaterial {
    active: RwLock<Arc<CaIdentity>>,
    retired: RwLock<Vec<Arc<CaIdentity>>>,
    keys: Arc<dyn KeyStore>,
}

impl KeyMaterial {
    pub fn new(identity: CaIdentity, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            active: RwLock::new(Arc::new(identity)),
            retired: RwLock::new(Vec::new()),
            keys,
        }
    }

    /// Start with previously retired identities, newest first
    pub fn with_retired(
        identity: CaIdentity,
        retired: Vec<CaIdentity>,
        keys: Arc<dyn KeyStore>,
    ) -> Result<Self> {
        let algorithm = identity.algorithm();
        if let Some(old) = retired.iter().find(|old| old.algorithm() != algorithm) {
            return Err(certus_key::Error::UnsupportedAlgorithm {
                requested: old.algorithm(),
                available: algorithm,
            }
            .into());
        }
        let material = Self::new(identity, keys);
        *material.retired.write().map_err(|_| PkiError::lock_poisoned())? =
            retired.into_iter().map(Arc::new).collect();
        Ok(material)
    }

    /// Snapshot of the active identity; stays valid across a rotation
    pub fn active(&self) -> Result<Arc<CaIdentity>> {
        let active = self.active.read().map_err(|_| PkiError::lock_poisoned())?;
        Ok(Arc::clone(&active))
    }

    /// Active identity first, then retired ones newest first
    pub fn trust_anchors(&self) -> Result<Vec<Arc<CaIdentity>>> {
        let mut anchors = vec![self.active()?];
        let retired = self.retired.read().map_err(|_| PkiError::lock_poisoned())?;
        anchors.extend(retired.iter().cloned());
        Ok(anchors)
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        Ok(self.active()?.algorithm())
    }

    pub fn root_certificate(&self) -> Result<Certificate> {
        Ok(self.active()?.certificate().clone())
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.keys
    }

    /// Sign with the CA's fixed algorithm
    pub fn sign(&self, bytes: &[u8], key_ref: &KeyRef) -> Result<Vec<u8>> {
        let algorithm = self.algorithm()?;
        self.sign_with(bytes, key_ref, algorithm)
    }

    /// Sign, failing with `UnsupportedAlgorithm` unless `algorithm` is the
    /// one the referenced key was created with
    pub fn sign_with(
        &self,
        bytes: &[u8],
        key_ref: &KeyRef,
        algorithm: Algorithm,
    ) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Err(certus_key::Error::EmptyInput.into());
        }

        match key_ref {
            KeyRef::CaRoot => {
                let identity = self.active()?;
                check_algorithm(algorithm, identity.algorithm())?;
                identity.sign(bytes)
            }
            KeyRef::Certificate(serial) => {
                let key = self.certificate_key(serial)?;
                check_algorithm(algorithm, key.algorithm())?;
                Ok(key.sign(bytes)?)
            }
        }
    }

    /// SPKI DER of the referenced key
    pub fn public_key_of(&self, key_ref: &KeyRef) -> Result<Vec<u8>> {
        match key_ref {
            KeyRef::CaRoot => Ok(self.active()?.certificate().public_key.clone()),
            KeyRef::Certificate(serial) => Ok(self.certificate_key(serial)?.public_key_der()?),
        }
    }

    /// Whether a private key is held for `key_ref`
    pub fn holds_key(&self, key_ref: &KeyRef) -> Result<bool> {
        match key_ref {
            KeyRef::CaRoot => Ok(true),
            KeyRef::Certificate(serial) => Ok(self.keys.exists(&KeyRef::handle(serial)?)?),
        }
    }

    /// Verify `signature` over `bytes` with an SPKI DER public key
    pub fn verify(&self, spki_der: &[u8], bytes: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(certus_key::verify_signature(spki_der, bytes, signature)?)
    }

    /// The trust anchor (active or retired) that signed `der`, if any
    pub fn issuer_of(&self, der: &[u8]) -> Result<Option<Arc<CaIdentity>>> {
        let parts = SignedParts::decode(der)?;
        for anchor in self.trust_anchors()? {
            let root = anchor.certificate();
            if parts.is_signed_by(&root.der, &root.public_key, root.public_key_algorithm)? {
                return Ok(Some(anchor));
            }
        }
        Ok(None)
    }

    /// Install `identity` as active and retire the current one.
    ///
    /// Requests already holding a snapshot finish with the old identity.
    /// Returns the retired identity.
    pub fn rotate(&self, identity: CaIdentity) -> Result<Arc<CaIdentity>> {
        let mut active = self.active.write().map_err(|_| PkiError::lock_poisoned())?;
        check_algorithm(identity.algorithm(), active.algorithm())?;

        let previous = std::mem::replace(&mut *active, Arc::new(identity));
        self.retired
            .write()
            .map_err(|_| PkiError::lock_poisoned())?
            .insert(0, Arc::clone(&previous));

        info!(
            retired = %previous.serial(),
            active = %active.serial(),
            "rotated CA identity"
        );
        Ok(previous)
    }

    pub(crate) fn store_certificate_key(&self, serial: &SerialNumber, key: &KeyPair) -> Result<()> {
        let metadata = KeyMetadata::new(
            KeyRef::handle(serial)?,
            key.algorithm(),
            Some(format!("certificate {serial}")),
        );
        Ok(self.keys.store_key(metadata, key.to_pkcs8_der()?)?)
    }

    pub(crate) fn discard_certificate_key(&self, serial: &SerialNumber) -> Result<()> {
        Ok(self.keys.delete_key(&KeyRef::handle(serial)?)?)
    }

    fn certificate_key(&self, serial: &SerialNumber) -> Result<KeyPair> {
        let (_, pkcs8_der) = self.keys.get_key(&KeyRef::handle(serial)?)?;
        Ok(KeyPair::from_pkcs8_der(&pkcs8_der)?)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("KeyMaterial");
        if let Ok(active) = self.active.read() {
            debug.field("active", active.serial());
        }
        debug.finish_non_exhaustive()
    }
}

/// Write `contents` to a temp file beside `path`, then rename over it
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(PkiError::InvalidConfiguration(format!(
            "not a file path: {}",
            path.display()
        )));
    };
    fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(".{}.tmp", name.to_string_lossy()));
    let mut tmp = fs::File::create(&tmp_path)?;
    tmp.write_all(contents)?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn check_algorithm(requested: Algorithm, available: Algorithm) -> Result<()> {
    if requested == available {
        Ok(())
    } else {
        Err(certus_key::Error::UnsupportedAlgorithm {
            requested,
            available,
        }
        .into())
    }
}
