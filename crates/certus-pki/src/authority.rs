//! CA 门面
//!
//! [`CertificateAuthority`] wires key material, registry and the three engines
//! together and owns on-disk layout when backed by a data directory:
//!
//! ```text
//! <data_dir>/ca/root.pem              active root certificate
//! <data_dir>/ca/retired/<serial>.pem  roots replaced by rotation
//! <data_dir>/keys/                    CA and per-certificate private keys
//! <data_dir>/certificates/            registry records
//! ```

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use certus_key::{create_key_store, Algorithm, CancellationToken, KeyStore, KeyStoreConfig};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    cert::{Certificate, CertificateRequest, SubjectName},
    config::{CaConfig, StorageConfig},
    engine::{
        IssuanceEngine, SignatureRecord, SigningEngine, SigningMetadata, VerificationEngine,
        VerificationResult,
    },
    error::{PkiError, Result},
    identity::{write_atomic, CaIdentity, KeyMaterial},
    serial::{RandomSerials, SerialAllocator},
    store::{CertificateStore, FileStore, MemoryStore, RevocationEntry},
    types::{now_seconds, CertificateStatus, RevocationReason, SerialNumber},
};

/// CA 信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaInfo {
    pub subject: SubjectName,
    pub issuer: SubjectName,
    pub serial_number: SerialNumber,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub algorithm: Algorithm,
    pub status: CertificateStatus,
    /// SHA-256 over the root DER
    pub thumbprint: String,
    /// Roots kept for verifying certificates issued before a rotation
    pub retired_roots: Vec<SerialNumber>,
}

/// 证书详情
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateDetails {
    pub certificate: Certificate,
    pub status: CertificateStatus,
}

/// A single certificate authority.
///
/// Every request runs against one snapshot of the active CA identity, so a
/// concurrent [`rotate`](Self::rotate) never mixes two roots within one
/// issuance. All methods take `&self`; share the value behind an `Arc`.
pub struct CertificateAuthority {
    config: CaConfig,
    keys: Arc<KeyMaterial>,
    registry: Arc<dyn CertificateStore>,
    serials: Arc<dyn SerialAllocator>,
    issuance: IssuanceEngine,
    signing: SigningEngine,
    verification: VerificationEngine,
    /// Set when the identity is persisted under a data directory
    storage: Option<StorageConfig>,
    /// Serializes rotations so each retired root reaches disk
    rotation: Mutex<()>,
}

impl CertificateAuthority {
    /// Assemble a CA from existing components
    pub fn from_parts(
        config: CaConfig,
        keys: Arc<KeyMaterial>,
        registry: Arc<dyn CertificateStore>,
        serials: Arc<dyn SerialAllocator>,
    ) -> Self {
        Self {
            issuance: IssuanceEngine::new(
                Arc::clone(&keys),
                Arc::clone(&registry),
                Arc::clone(&serials),
                config.policy(),
            ),
            signing: SigningEngine::new(Arc::clone(&keys), Arc::clone(&registry)),
            verification: VerificationEngine::new(Arc::clone(&keys), Arc::clone(&registry)),
            config,
            keys,
            registry,
            serials,
            storage: None,
            rotation: Mutex::new(()),
        }
    }

    /// A fresh CA that keeps everything in memory
    pub fn in_memory(config: CaConfig) -> Result<Self> {
        config.validate()?;
        let serials: Arc<dyn SerialAllocator> = Arc::new(RandomSerials::new());
        let identity = generate_identity(&config, config.algorithm, serials.as_ref())?;
        let keys = Arc::new(KeyMaterial::new(identity, create_key_store(KeyStoreConfig::Memory)?));
        Ok(Self::from_parts(config, keys, Arc::new(MemoryStore::new()), serials))
    }

    /// 初始化 CA: create a new identity under `config.storage.data_dir`.
    ///
    /// Fails if the data directory already holds a CA.
    pub fn init(config: CaConfig) -> Result<Self> {
        config.validate()?;
        let storage = config.storage.clone();
        let root_pem = storage.root_pem_path();
        if root_pem.exists() {
            return Err(PkiError::InvalidConfiguration(format!(
                "a CA is already initialized at {}",
                storage.data_dir.display()
            )));
        }

        let key_store = storage.key_store()?;
        let registry = Arc::new(FileStore::new(storage.certificates_dir())?);
        let serials: Arc<dyn SerialAllocator> = Arc::new(RandomSerials::new());

        let identity = generate_identity(&config, config.algorithm, serials.as_ref())?;
        identity.save(key_store.as_ref(), &root_pem)?;
        info!(
            data_dir = %storage.data_dir.display(),
            serial = %identity.serial(),
            "initialized certificate authority"
        );

        let keys = Arc::new(KeyMaterial::new(identity, key_store));
        let mut ca = Self::from_parts(config, keys, registry, serials);
        ca.storage = Some(storage);
        Ok(ca)
    }

    /// Open a CA previously created with [`init`](Self::init)
    pub fn open(config: CaConfig) -> Result<Self> {
        config.validate()?;
        let storage = config.storage.clone();
        let root_pem = storage.root_pem_path();
        if !root_pem.exists() {
            return Err(PkiError::InvalidConfiguration(format!(
                "no CA found at {}, run init first",
                storage.data_dir.display()
            )));
        }

        let key_store = storage.key_store()?;
        let identity = CaIdentity::load(key_store.as_ref(), &root_pem)?;
        let retired = load_retired(key_store.as_ref(), &storage.retired_dir(), identity.serial())?;
        let keys = Arc::new(KeyMaterial::with_retired(identity, retired, Arc::clone(&key_store))?);
        let registry = Arc::new(FileStore::new(storage.certificates_dir())?);

        let mut ca = Self::from_parts(config, keys, registry, Arc::new(RandomSerials::new()));
        ca.storage = Some(storage);
        Ok(ca)
    }

    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    pub fn key_material(&self) -> &Arc<KeyMaterial> {
        &self.keys
    }

    pub fn registry(&self) -> &Arc<dyn CertificateStore> {
        &self.registry
    }

    /// 获取 CA 信息
    pub fn get_ca_info(&self) -> Result<CaInfo> {
        let anchors = self.keys.trust_anchors()?;
        let Some((active, retired)) = anchors.split_first() else {
            return Err(PkiError::InvalidConfiguration("CA has no identity".to_string()));
        };
        let root = active.certificate();
        let now = now_seconds();
        let status = if root.is_expired_at(now) {
            CertificateStatus::Expired {
                expired_at: root.not_after,
            }
        } else {
            CertificateStatus::Active
        };

        Ok(CaInfo {
            subject: root.subject.clone(),
            issuer: root.issuer.clone(),
            serial_number: root.serial_number.clone(),
            not_before: root.not_before,
            not_after: root.not_after,
            algorithm: active.algorithm(),
            status,
            thumbprint: root.thumbprint(),
            retired_roots: retired.iter().map(|r| r.serial().clone()).collect(),
        })
    }

    /// 按序列号查询证书
    pub fn get_certificate_by_serial(&self, serial: &str) -> Result<CertificateDetails> {
        let serial = SerialNumber::parse(serial)?;
        let entry = self.registry.get_by_serial(&serial)?;
        Ok(CertificateDetails {
            status: entry.status_at(now_seconds()),
            certificate: entry.certificate,
        })
    }

    /// 签发证书
    pub fn issue_certificate(&self, request: &CertificateRequest) -> Result<Certificate> {
        self.issuance.issue(request)
    }

    /// 根据 CSR 签发证书
    pub fn issue_from_csr(&self, csr_pem: &str, validity_days: Option<u32>) -> Result<Certificate> {
        self.issuance.issue_from_csr(csr_pem, validity_days)
    }

    /// 撤销证书
    pub fn revoke_certificate(
        &self,
        serial: &str,
        reason: RevocationReason,
    ) -> Result<RevocationEntry> {
        let serial = SerialNumber::parse(serial)?;
        let entry = self.registry.revoke(&serial, reason, now_seconds())?;
        info!(%serial, reason = reason.as_str(), "revoked certificate");
        Ok(entry)
    }

    /// Certificates neither revoked nor expired, in issuance order
    pub fn list_active(&self) -> Result<Vec<Certificate>> {
        Ok(self
            .registry
            .list_active(now_seconds())?
            .into_iter()
            .map(|entry| entry.certificate)
            .collect())
    }

    /// Every registered certificate with its current status
    pub fn list_certificates(&self) -> Result<Vec<CertificateDetails>> {
        let now = now_seconds();
        Ok(self
            .registry
            .list()?
            .into_iter()
            .map(|entry| CertificateDetails {
                status: entry.status_at(now),
                certificate: entry.certificate,
            })
            .collect())
    }

    /// 签名文档
    pub fn sign_document(
        &self,
        document: &[u8],
        serial: &str,
        metadata: SigningMetadata,
    ) -> Result<SignatureRecord> {
        let serial = SerialNumber::parse(serial)?;
        self.signing.sign_document(document, &serial, metadata)
    }

    pub fn sign_reader<R: Read>(
        &self,
        reader: R,
        serial: &str,
        metadata: SigningMetadata,
        cancel: Option<&CancellationToken>,
    ) -> Result<SignatureRecord> {
        let serial = SerialNumber::parse(serial)?;
        self.signing.sign_reader(reader, &serial, metadata, cancel)
    }

    /// 验证签名
    pub fn validate_signature(
        &self,
        record: &SignatureRecord,
        document: &[u8],
    ) -> Result<VerificationResult> {
        self.verification.verify(document, record)
    }

    pub fn validate_signature_reader<R: Read>(
        &self,
        record: &SignatureRecord,
        reader: R,
        cancel: Option<&CancellationToken>,
    ) -> Result<VerificationResult> {
        self.verification.verify_reader(reader, record, cancel)
    }

    /// 验证第三方出示的证书是否由本 CA 签发且仍然有效
    pub fn verify_presented_certificate(&self, pem: &str) -> Result<VerificationResult> {
        self.verification.verify_presented_certificate(pem)
    }

    /// Replace the CA identity with a freshly generated one.
    ///
    /// The new root uses the configured subject and the current algorithm.
    /// The previous root stays a trust anchor, so what it issued keeps
    /// verifying. On disk the old root moves to `ca/retired/<serial>.pem`.
    ///
    /// The retired copy is written before `root.pem` is replaced, and both
    /// writes go through a temp file and rename.
    pub fn rotate(&self) -> Result<CaInfo> {
        let _rotation = self.rotation.lock().map_err(|_| PkiError::lock_poisoned())?;

        let previous = self.keys.active()?;
        let identity =
            generate_identity(&self.config, previous.algorithm(), self.serials.as_ref())?;

        if let Some(storage) = &self.storage {
            write_atomic(
                &storage.retired_dir().join(format!("{}.pem", previous.serial())),
                previous.certificate().to_pem().as_bytes(),
            )?;
            identity.save(self.keys.key_store().as_ref(), &storage.root_pem_path())?;
        }

        self.keys.rotate(identity)?;
        self.get_ca_info()
    }
}

fn generate_identity(
    config: &CaConfig,
    algorithm: Algorithm,
    serials: &dyn SerialAllocator,
) -> Result<CaIdentity> {
    CaIdentity::generate(&config.subject, algorithm, config.root_validity_days, serials)
}

/// Retired identities, newest first.
///
/// A copy of the active root is skipped: rotation writes it before
/// replacing `root.pem`, so an interrupted rotation leaves one behind.
fn load_retired(keys: &dyn KeyStore, dir: &Path, active: &SerialNumber) -> Result<Vec<CaIdentity>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "pem"))
        .collect();
    paths.sort();

    let mut retired = Vec::with_capacity(paths.len());
    for path in paths {
        match CaIdentity::load(keys, &path) {
            Ok(identity) if identity.serial() == active => {
                warn!(path = %path.display(), "ignoring retired copy of the active root");
            }
            Ok(identity) => retired.push(identity),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable retired root"),
        }
    }
    retired.sort_by(|a, b| b.certificate().not_before.cmp(&a.certificate().not_before));
    Ok(retired)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{error::ErrorKind, types::FailureReason};

    fn file_config(dir: &TempDir) -> CaConfig {
        let mut config = CaConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.storage.encryption_key = Some(hex::encode([3u8; 32]));
        config
    }

    #[test]
    fn test_ca_info() {
        let ca = CertificateAuthority::in_memory(CaConfig::default()).unwrap();
        let info = ca.get_ca_info().unwrap();
        assert_eq!(info.subject.common_name, "Certus Root CA");
        assert_eq!(info.issuer, info.subject);
        assert_eq!(info.algorithm, Algorithm::EcdsaP256Sha256);
        assert_eq!(info.status, CertificateStatus::Active);
        assert_eq!(info.thumbprint.len(), 64);
        assert!(info.retired_roots.is_empty());
    }

    #[test]
    fn test_lookup_by_serial_string() {
        let ca = CertificateAuthority::in_memory(CaConfig::default()).unwrap();
        let cert = ca.issue_certificate(&CertificateRequest::new("example.com")).unwrap();

        let upper = cert.serial_number.as_str().to_uppercase();
        let details = ca.get_certificate_by_serial(&upper).unwrap();
        assert_eq!(details.certificate, cert);
        assert_eq!(details.status, CertificateStatus::Active);

        let err = ca.get_certificate_by_serial("0123").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = ca.get_certificate_by_serial("not-hex").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_revoke_twice() {
        let ca = CertificateAuthority::in_memory(CaConfig::default()).unwrap();
        let cert = ca.issue_certificate(&CertificateRequest::new("example.com")).unwrap();
        ca.revoke_certificate(cert.serial_number.as_str(), RevocationReason::KeyCompromise)
            .unwrap();
        assert!(matches!(
            ca.revoke_certificate(cert.serial_number.as_str(), RevocationReason::Superseded),
            Err(PkiError::AlreadyRevoked(_))
        ));

        let details = ca.get_certificate_by_serial(cert.serial_number.as_str()).unwrap();
        assert!(matches!(
            details.status,
            CertificateStatus::Revoked {
                reason: RevocationReason::KeyCompromise,
                ..
            }
        ));
        assert!(ca.list_active().unwrap().is_empty());
        assert_eq!(ca.list_certificates().unwrap().len(), 1);
    }

    #[test]
    fn test_init_then_open() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let (serial, record) = {
            let ca = CertificateAuthority::init(config.clone()).unwrap();
            let cert = ca.issue_certificate(&CertificateRequest::new("example.com")).unwrap();
            let record = ca
                .sign_document(
                    b"persisted",
                    cert.serial_number.as_str(),
                    SigningMetadata::default(),
                )
                .unwrap();
            (cert.serial_number, record)
        };
        assert!(dir.path().join("ca").join("root.pem").exists());

        let ca = CertificateAuthority::open(config).unwrap();
        assert_eq!(ca.list_active().unwrap().len(), 1);
        assert!(ca.validate_signature(&record, b"persisted").unwrap().valid);
        // the per-certificate key survived the restart
        ca.sign_document(b"again", serial.as_str(), SigningMetadata::default())
            .unwrap();
    }

    #[test]
    fn test_init_refuses_existing_ca() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);
        CertificateAuthority::init(config.clone()).unwrap();
        assert!(matches!(
            CertificateAuthority::init(config),
            Err(PkiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_open_without_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            CertificateAuthority::open(file_config(&dir)),
            Err(PkiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_open_with_wrong_encryption_key() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);
        CertificateAuthority::init(config.clone()).unwrap();

        let mut wrong = config;
        wrong.storage.encryption_key = Some(hex::encode([4u8; 32]));
        assert!(CertificateAuthority::open(wrong).is_err());
    }

    #[test]
    fn test_rotation_persists() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let ca = CertificateAuthority::init(config.clone()).unwrap();
        let old_root = ca.get_ca_info().unwrap().serial_number;
        let cert = ca.issue_certificate(&CertificateRequest::new("before")).unwrap();
        let record = ca
            .sign_document(b"doc", cert.serial_number.as_str(), SigningMetadata::default())
            .unwrap();

        let info = ca.rotate().unwrap();
        assert_ne!(info.serial_number, old_root);
        assert_eq!(info.retired_roots, vec![old_root.clone()]);
        assert!(dir
            .path()
            .join("ca")
            .join("retired")
            .join(format!("{old_root}.pem"))
            .exists());
        drop(ca);

        let ca = CertificateAuthority::open(config).unwrap();
        let info = ca.get_ca_info().unwrap();
        assert_eq!(info.retired_roots, vec![old_root]);
        assert!(ca.validate_signature(&record, b"doc").unwrap().valid);
        assert!(ca.verify_presented_certificate(&cert.to_pem()).unwrap().valid);

        let fresh = ca.issue_certificate(&CertificateRequest::new("after")).unwrap();
        assert!(fresh.is_issued_by(&ca.key_material().root_certificate().unwrap()).unwrap());
        assert!(!fresh.is_issued_by(&cert).unwrap());
    }

    #[test]
    fn test_concurrent_rotations_persist_every_root() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);
        let ca = Arc::new(CertificateAuthority::init(config.clone()).unwrap());
        let first_root = ca.get_ca_info().unwrap().serial_number;

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let ca = Arc::clone(&ca);
                std::thread::spawn(move || {
                    ca.rotate().unwrap();
                    let cert = ca
                        .issue_certificate(&CertificateRequest::new(format!("after-{i}")))
                        .unwrap();
                    let document = format!("document {i}").into_bytes();
                    let serial = cert.serial_number.as_str();
                    let record = ca
                        .sign_document(&document, serial, SigningMetadata::default())
                        .unwrap();
                    (cert, document, record)
                })
            })
            .collect();
        let mut issued: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let latest = ca.issue_certificate(&CertificateRequest::new("latest")).unwrap();
        let record = ca
            .sign_document(b"latest", latest.serial_number.as_str(), SigningMetadata::default())
            .unwrap();
        issued.push((latest, b"latest".to_vec(), record));
        let before = ca.get_ca_info().unwrap();
        drop(ca);

        let ca = CertificateAuthority::open(config).unwrap();
        let info = ca.get_ca_info().unwrap();
        assert_eq!(info.serial_number, before.serial_number);
        assert_eq!(info.retired_roots.len(), 2);
        assert!(info.retired_roots.contains(&first_root));
        assert!(!info.retired_roots.contains(&info.serial_number));

        for (cert, document, record) in &issued {
            let result = ca.verify_presented_certificate(&cert.to_pem()).unwrap();
            assert!(result.valid, "{}: {:?}", cert.subject, result.reasons);
            assert!(ca.validate_signature(record, document).unwrap().valid);
        }
    }

    #[test]
    fn test_open_ignores_retired_copy_of_active_root() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);
        let serial = CertificateAuthority::init(config.clone())
            .unwrap()
            .get_ca_info()
            .unwrap()
            .serial_number;

        // rotation stopped after writing the retired copy
        let retired_dir = dir.path().join("ca").join("retired");
        fs::create_dir_all(&retired_dir).unwrap();
        fs::copy(
            dir.path().join("ca").join("root.pem"),
            retired_dir.join(format!("{serial}.pem")),
        )
        .unwrap();

        let ca = CertificateAuthority::open(config).unwrap();
        let info = ca.get_ca_info().unwrap();
        assert_eq!(info.serial_number, serial);
        assert!(info.retired_roots.is_empty());
    }

    #[test]
    fn test_unregistered_signer_reported() {
        let ca = CertificateAuthority::in_memory(CaConfig::default()).unwrap();
        let other = CertificateAuthority::in_memory(CaConfig::default()).unwrap();
        let cert = other.issue_certificate(&CertificateRequest::new("elsewhere")).unwrap();
        let record = other
            .sign_document(b"doc", cert.serial_number.as_str(), SigningMetadata::default())
            .unwrap();

        let result = ca.validate_signature(&record, b"doc").unwrap();
        assert_eq!(result.reasons, vec![FailureReason::UnknownSigner]);
    }
}
