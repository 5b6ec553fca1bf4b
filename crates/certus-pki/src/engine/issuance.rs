use std::sync::Arc;

use certus_key::KeyPair;
use der::Encode;
use time::Duration;
use tracing::{info, warn};

use crate::{
    cert::{key_identifier, x509, Certificate, CertificateRequest, SubjectAltName, SubjectName},
    csr::Csr,
    error::{PkiError, Result},
    identity::{CaIdentity, KeyMaterial},
    serial::SerialAllocator,
    store::CertificateStore,
    types::{now_seconds, KeyOrigin, SerialNumber},
};

/// Validity rules applied to every issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuancePolicy {
    pub default_validity_days: u32,
    /// Longer requests are rejected, not clamped
    pub max_validity_days: u32,
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self {
            default_validity_days: 365,
            max_validity_days: 825,
        }
    }
}

/// Subject key and origin for one issuance
enum SubjectKey<'a> {
    Generated(&'a KeyPair),
    Requested(&'a [u8]),
}

/// Turns subject requests into registered certificates.
///
/// Issuance is all-or-nothing: the certificate is signed before anything is
/// written, a generated subject key is stored only for the serial being
/// registered, and it is deleted again if registration fails.
pub struct IssuanceEngine {
    keys: Arc<KeyMaterial>,
    registry: Arc<dyn CertificateStore>,
    serials: Arc<dyn SerialAllocator>,
    policy: IssuancePolicy,
}

impl IssuanceEngine {
    pub fn new(
        keys: Arc<KeyMaterial>,
        registry: Arc<dyn CertificateStore>,
        serials: Arc<dyn SerialAllocator>,
        policy: IssuancePolicy,
    ) -> Self {
        Self {
            keys,
            registry,
            serials,
            policy,
        }
    }

    pub fn policy(&self) -> IssuancePolicy {
        self.policy
    }

    /// Issue a certificate with a freshly generated key held by the CA
    pub fn issue(&self, request: &CertificateRequest) -> Result<Certificate> {
        let subject = request.subject.normalized();
        subject.validate()?;
        let alt_names = request
            .subject_alt_names
            .iter()
            .map(|entry| SubjectAltName::parse(entry))
            .collect::<Result<Vec<_>>>()?;
        let validity_days = self.validity_days(request.validity_days)?;

        let key = KeyPair::generate(self.keys.algorithm()?)?;
        self.issue_for(&subject, &alt_names, validity_days, SubjectKey::Generated(&key))
    }

    /// Issue a certificate for the public key of a PKCS#10 request
    pub fn issue_from_csr(&self, csr_pem: &str, validity_days: Option<u32>) -> Result<Certificate> {
        let csr = Csr::from_pem(csr_pem)?;
        csr.verify_signature()?;
        let subject = csr.subject()?.normalized();
        subject.validate()?;
        let validity_days = self.validity_days(validity_days)?;

        let spki = csr.public_key_der()?;
        self.issue_for(&subject, &[], validity_days, SubjectKey::Requested(&spki))
    }

    fn validity_days(&self, requested: Option<u32>) -> Result<u32> {
        let days = requested.unwrap_or(self.policy.default_validity_days);
        if days == 0 {
            return Err(PkiError::invalid_subject("validity_days", "must be at least one day"));
        }
        if days > self.policy.max_validity_days {
            return Err(PkiError::ValidityPeriodTooLong {
                requested: days,
                max: self.policy.max_validity_days,
            });
        }
        Ok(days)
    }

    fn issue_for(
        &self,
        subject: &SubjectName,
        alt_names: &[SubjectAltName],
        validity_days: u32,
        key: SubjectKey<'_>,
    ) -> Result<Certificate> {
        // one snapshot for the whole issuance, even across a rotation
        let ca = self.keys.active()?;

        let mut retried = false;
        loop {
            let serial = self.serials.next()?;
            match self.register(&ca, &serial, subject, alt_names, validity_days, &key) {
                Ok(certificate) => {
                    info!(
                        serial = %certificate.serial_number,
                        subject = %certificate.subject,
                        not_after = %certificate.not_after,
                        "issued certificate"
                    );
                    return Ok(certificate);
                }
                Err(PkiError::DuplicateSerial(_)) if !retried => {
                    warn!(%serial, "serial collision, allocating a new serial");
                    retried = true;
                }
                Err(PkiError::DuplicateSerial(serial)) => {
                    return Err(PkiError::RegistrationConflict(format!(
                        "serial {serial} collided after one retry"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn register(
        &self,
        ca: &CaIdentity,
        serial: &SerialNumber,
        subject: &SubjectName,
        alt_names: &[SubjectAltName],
        validity_days: u32,
        key: &SubjectKey<'_>,
    ) -> Result<Certificate> {
        let (spki, origin) = match key {
            SubjectKey::Generated(key) => (key.public_key_der()?, KeyOrigin::Generated),
            SubjectKey::Requested(spki) => (spki.to_vec(), KeyOrigin::Csr),
        };
        let certificate =
            build_certificate(ca, serial, subject, alt_names, validity_days, &spki, origin)?;

        if let SubjectKey::Generated(key) = key {
            self.keys
                .store_certificate_key(serial, key)
                .map_err(|e| match e {
                    PkiError::Key(certus_key::Error::KeyExists(_)) => {
                        PkiError::DuplicateSerial(serial.to_string())
                    }
                    other => other,
                })?;
        }

        if let Err(e) = self.registry.insert(certificate.clone()) {
            if matches!(key, SubjectKey::Generated(_)) {
                if let Err(cleanup) = self.keys.discard_certificate_key(serial) {
                    warn!(
                        %serial,
                        error = %cleanup,
                        "failed to discard key of unregistered certificate"
                    );
                }
            }
            return Err(e);
        }

        Ok(certificate)
    }
}

fn build_certificate(
    ca: &CaIdentity,
    serial: &SerialNumber,
    subject: &SubjectName,
    alt_names: &[SubjectAltName],
    validity_days: u32,
    spki: &[u8],
    origin: KeyOrigin,
) -> Result<Certificate> {
    let not_before = now_seconds();
    let not_after = not_before + Duration::days(i64::from(validity_days));

    let root_not_after = ca.certificate().not_after;
    if not_after > root_not_after {
        // a leaf may not outlive its issuer
        let remaining = (root_not_after - not_before).whole_days().max(0);
        return Err(PkiError::ValidityPeriodTooLong {
            requested: validity_days,
            max: u32::try_from(remaining).unwrap_or(u32::MAX),
        });
    }

    let algorithm = ca.algorithm();
    let tbs = x509::build_tbs(x509::TbsTemplate {
        serial,
        issuer: ca.subject(),
        subject,
        not_before,
        not_after,
        subject_public_key: spki,
        algorithm,
        extensions: x509::leaf_extensions(&key_identifier(spki), &ca.key_id(), alt_names)?,
    })?;
    let signature = ca.sign(&tbs.to_der()?)?;
    let der = x509::assemble(tbs, algorithm, &signature)?;
    Certificate::from_der(&der, origin)
}

#[cfg(test)]
mod tests {
    use certus_key::{Algorithm, MemoryKeyStore};

    use super::*;
    use crate::{
        identity::KeyRef,
        serial::{RandomSerials, SequentialSerials},
        store::MemoryStore,
        types::CertificateStatus,
    };

    struct Fixture {
        keys: Arc<KeyMaterial>,
        registry: Arc<MemoryStore>,
        engine: IssuanceEngine,
    }

    fn fixture_with(serials: Arc<dyn SerialAllocator>, registry: Arc<MemoryStore>) -> Fixture {
        let identity = CaIdentity::generate(
            &SubjectName::new("Issuance Test Root"),
            Algorithm::EcdsaP256Sha256,
            3650,
            &RandomSerials,
        )
        .unwrap();
        let keys = Arc::new(KeyMaterial::new(identity, Arc::new(MemoryKeyStore::new())));
        let engine = IssuanceEngine::new(
            Arc::clone(&keys),
            registry.clone(),
            serials,
            IssuancePolicy::default(),
        );
        Fixture {
            keys,
            registry,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(RandomSerials), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_issue_default_validity() {
        let f = fixture();
        let cert = f.engine.issue(&CertificateRequest::new("example.com")).unwrap();

        assert_eq!(cert.version, 3);
        assert_eq!(cert.subject.common_name, "example.com");
        assert_eq!(cert.issuer, f.keys.root_certificate().unwrap().subject);
        assert_eq!(cert.not_after - cert.not_before, Duration::days(365));
        assert_eq!(cert.key_origin, KeyOrigin::Generated);
        assert!(cert.is_issued_by(&f.keys.root_certificate().unwrap()).unwrap());

        let entry = f.registry.get_by_serial(&cert.serial_number).unwrap();
        assert_eq!(entry.status_at(now_seconds()), CertificateStatus::Active);
        assert!(f.keys.holds_key(&KeyRef::Certificate(cert.serial_number.clone())).unwrap());
    }

    #[test]
    fn test_identical_requests_get_distinct_serials() {
        let f = fixture();
        let request = CertificateRequest::new("example.com");
        let a = f.engine.issue(&request).unwrap();
        let b = f.engine.issue(&request).unwrap();
        assert_ne!(a.serial_number, b.serial_number);
        assert_eq!(f.registry.len().unwrap(), 2);
    }

    #[test]
    fn test_invalid_country_registers_nothing() {
        let f = fixture();
        let mut request = CertificateRequest::new("example.com");
        request.subject.country = Some("USA".to_string());

        let err = f.engine.issue(&request).unwrap_err();
        assert!(matches!(err, PkiError::InvalidSubject { ref field, .. } if field == "country"));
        assert_eq!(f.registry.len().unwrap(), 0);
        assert!(f.keys.key_store().list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_validity_too_long_rejected() {
        let f = fixture();
        let mut request = CertificateRequest::new("example.com");
        request.validity_days = Some(826);
        assert!(matches!(
            f.engine.issue(&request),
            Err(PkiError::ValidityPeriodTooLong {
                requested: 826,
                max: 825
            })
        ));

        request.validity_days = Some(825);
        let cert = f.engine.issue(&request).unwrap();
        assert_eq!(cert.not_after - cert.not_before, Duration::days(825));
    }

    #[test]
    fn test_subject_alt_names_encoded() {
        let f = fixture();
        let mut request = CertificateRequest::new("example.com");
        request.subject_alt_names =
            vec!["example.com".into(), "10.1.2.3".into(), "ops@example.com".into()];
        let cert = f.engine.issue(&request).unwrap();
        let rendered: Vec<String> =
            cert.subject_alt_names.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["DNS:example.com", "IP:10.1.2.3", "email:ops@example.com"]);
    }

    #[test]
    fn test_malformed_san_rejected() {
        let f = fixture();
        let mut request = CertificateRequest::new("example.com");
        request.subject_alt_names = vec!["bad name".into()];
        assert!(matches!(
            f.engine.issue(&request),
            Err(PkiError::InvalidSubjectAltName { .. })
        ));
        assert_eq!(f.registry.len().unwrap(), 0);
    }

    #[test]
    fn test_collision_retried_once() {
        let registry = Arc::new(MemoryStore::new());
        // occupy serial 01 through another CA sharing the registry
        let other = fixture_with(Arc::new(SequentialSerials::new(1, 1)), registry.clone());
        other.engine.issue(&CertificateRequest::new("first")).unwrap();

        let f = fixture_with(Arc::new(SequentialSerials::new(1, 10)), registry);
        let cert = f.engine.issue(&CertificateRequest::new("second")).unwrap();
        assert_eq!(cert.serial_number.as_str(), "02");
        assert!(f.keys.holds_key(&KeyRef::Certificate(cert.serial_number.clone())).unwrap());
        assert!(!f
            .keys
            .holds_key(&KeyRef::Certificate(SerialNumber::parse("01").unwrap()))
            .unwrap());
    }

    #[test]
    fn test_second_collision_is_registration_conflict() {
        let registry = Arc::new(MemoryStore::new());
        let other = fixture_with(Arc::new(SequentialSerials::new(1, 2)), registry.clone());
        other.engine.issue(&CertificateRequest::new("a")).unwrap();
        other.engine.issue(&CertificateRequest::new("b")).unwrap();

        let f = fixture_with(Arc::new(SequentialSerials::new(1, 10)), registry.clone());
        assert!(matches!(
            f.engine.issue(&CertificateRequest::new("c")),
            Err(PkiError::RegistrationConflict(_))
        ));
        assert_eq!(registry.len().unwrap(), 2);
        assert!(f.keys.key_store().list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_exhausted_allocator_surfaces() {
        let f = fixture_with(Arc::new(SequentialSerials::new(1, 1)), Arc::new(MemoryStore::new()));
        f.engine.issue(&CertificateRequest::new("one")).unwrap();
        assert!(matches!(
            f.engine.issue(&CertificateRequest::new("two")),
            Err(PkiError::AllocatorExhausted)
        ));
    }

    #[test]
    fn test_issue_from_csr() {
        let f = fixture();
        let requester = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let mut subject = SubjectName::new("device.example.com");
        subject.country = Some("DE".to_string());
        let pem = Csr::create(&requester, &subject).unwrap().to_pem().unwrap();

        let cert = f.engine.issue_from_csr(&pem, Some(30)).unwrap();
        assert_eq!(cert.subject, subject);
        assert_eq!(cert.key_origin, KeyOrigin::Csr);
        assert_eq!(cert.public_key, requester.public_key_der().unwrap());
        assert_eq!(cert.public_key_algorithm, Algorithm::Ed25519);
        assert_eq!(cert.signature_algorithm, Algorithm::EcdsaP256Sha256);
        assert!(!f.keys.holds_key(&KeyRef::Certificate(cert.serial_number)).unwrap());
    }

    #[test]
    fn test_csr_with_invalid_subject_rejected() {
        let f = fixture();
        let requester = KeyPair::generate(Algorithm::EcdsaP256Sha256).unwrap();
        let mut subject = SubjectName::new("device.example.com");
        subject.country = Some("USA".to_string());
        let pem = Csr::create(&requester, &subject).unwrap().to_pem().unwrap();

        assert!(matches!(
            f.engine.issue_from_csr(&pem, None),
            Err(PkiError::InvalidSubject { .. })
        ));
        assert_eq!(f.registry.len().unwrap(), 0);
    }

    #[test]
    fn test_leaf_cannot_outlive_root() {
        let identity = CaIdentity::generate(
            &SubjectName::new("Short Root"),
            Algorithm::Ed25519,
            30,
            &RandomSerials,
        )
        .unwrap();
        let keys = Arc::new(KeyMaterial::new(identity, Arc::new(MemoryKeyStore::new())));
        let registry = Arc::new(MemoryStore::new());
        let engine = IssuanceEngine::new(
            keys,
            registry.clone(),
            Arc::new(RandomSerials),
            IssuancePolicy::default(),
        );

        assert!(matches!(
            engine.issue(&CertificateRequest::new("leaf")),
            Err(PkiError::ValidityPeriodTooLong { requested: 365, .. })
        ));
        assert_eq!(registry.len().unwrap(), 0);
    }
}
