use std::{io::Read, sync::Arc};

use certus_key::{digest_reader, Algorithm, CancellationToken, DigestAlgorithm};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    cert::Certificate,
    error::{PkiError, Result},
    identity::{KeyMaterial, KeyRef},
    store::CertificateStore,
    types::{hex_bytes, now_seconds, SerialNumber},
};

/// 签名附加信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningMetadata {
    pub reason: Option<String>,
    pub location: Option<String>,
}

impl SigningMetadata {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            location: None,
        }
    }
}

/// A detached signature over a document digest.
///
/// The signature covers `document_digest`, not the document itself, so the
/// record can be checked against the document by digest alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    #[serde(with = "hex_bytes")]
    pub document_digest: Vec<u8>,
    pub digest_algorithm: DigestAlgorithm,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    pub signature_algorithm: Algorithm,
    pub signer_certificate_serial: SerialNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub signed_at: OffsetDateTime,
}

impl SignatureRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record, rejecting a digest of the wrong length for its algorithm
    pub fn from_json(json: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(json)?;
        let expected = record.digest_algorithm.output_len();
        if record.document_digest.len() != expected {
            return Err(PkiError::InvalidRequest(format!(
                "document_digest has {} bytes, {} needs {expected}",
                record.document_digest.len(),
                record.digest_algorithm.name()
            )));
        }
        Ok(record)
    }
}

/// Produces signature records with the keys of issued certificates
pub struct SigningEngine {
    keys: Arc<KeyMaterial>,
    registry: Arc<dyn CertificateStore>,
}

impl SigningEngine {
    pub fn new(keys: Arc<KeyMaterial>, registry: Arc<dyn CertificateStore>) -> Self {
        Self { keys, registry }
    }

    /// Sign an in-memory document with the key of certificate `serial`
    pub fn sign_document(
        &self,
        document: &[u8],
        serial: &SerialNumber,
        metadata: SigningMetadata,
    ) -> Result<SignatureRecord> {
        self.sign_reader(document, serial, metadata, None)
    }

    /// Sign a document streamed from `reader`.
    ///
    /// The signer is checked before the document is read and again once the
    /// digest is complete, since its status can change in between.
    pub fn sign_reader<R: Read>(
        &self,
        reader: R,
        serial: &SerialNumber,
        metadata: SigningMetadata,
        cancel: Option<&CancellationToken>,
    ) -> Result<SignatureRecord> {
        self.usable_signer(serial, now_seconds())?;

        let digest_algorithm = DigestAlgorithm::default();
        let (document_digest, length) = digest_reader(reader, digest_algorithm, cancel)?;
        if length == 0 {
            return Err(certus_key::Error::EmptyInput.into());
        }

        let signed_at = now_seconds();
        let signer = self.usable_signer(serial, signed_at)?;
        let signature = self.keys.sign_with(
            &document_digest,
            &KeyRef::Certificate(serial.clone()),
            signer.public_key_algorithm,
        )?;

        debug!(%serial, bytes = length, "signed document");
        Ok(SignatureRecord {
            document_digest,
            digest_algorithm,
            signature,
            signature_algorithm: signer.public_key_algorithm,
            signer_certificate_serial: serial.clone(),
            reason: metadata.reason,
            location: metadata.location,
            signed_at,
        })
    }

    /// The signer must be registered, unrevoked and inside its validity window
    fn usable_signer(&self, serial: &SerialNumber, at: OffsetDateTime) -> Result<Certificate> {
        let invalid = |reason: &str| PkiError::SignerCertificateInvalid {
            serial: serial.to_string(),
            reason: reason.to_string(),
        };

        let entry = match self.registry.get_by_serial(serial) {
            Ok(entry) => entry,
            Err(PkiError::NotFound(_)) => return Err(invalid("not registered")),
            Err(e) => return Err(e),
        };
        if entry.revocation.is_some() {
            return Err(invalid("revoked"));
        }
        if at < entry.certificate.not_before {
            return Err(invalid("not yet valid"));
        }
        if entry.certificate.is_expired_at(at) {
            return Err(invalid("expired"));
        }
        Ok(entry.certificate)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use certus_key::{verify_signature, KeyPair, MemoryKeyStore};
    use time::Duration;

    use super::*;
    use crate::{
        cert::{CertificateRequest, SubjectName},
        engine::{IssuanceEngine, IssuancePolicy},
        error::ErrorKind,
        identity::CaIdentity,
        serial::RandomSerials,
        store::MemoryStore,
        test_support,
        types::{KeyOrigin, RevocationReason},
    };

    struct Fixture {
        keys: Arc<KeyMaterial>,
        registry: Arc<MemoryStore>,
        issuance: IssuanceEngine,
        signing: SigningEngine,
    }

    fn fixture(algorithm: Algorithm) -> Fixture {
        let identity = CaIdentity::generate(
            &SubjectName::new("Signing Test Root"),
            algorithm,
            3650,
            &RandomSerials,
        )
        .unwrap();
        let keys = Arc::new(KeyMaterial::new(identity, Arc::new(MemoryKeyStore::new())));
        let registry = Arc::new(MemoryStore::new());
        Fixture {
            issuance: IssuanceEngine::new(
                Arc::clone(&keys),
                registry.clone(),
                Arc::new(RandomSerials),
                IssuancePolicy::default(),
            ),
            signing: SigningEngine::new(Arc::clone(&keys), registry.clone()),
            keys,
            registry,
        }
    }

    #[test]
    fn test_signature_covers_digest() {
        for algorithm in [Algorithm::EcdsaP256Sha256, Algorithm::Ed25519] {
            let f = fixture(algorithm);
            let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
            let metadata = SigningMetadata::with_reason("approval");
            let record = f
                .signing
                .sign_document(b"0123456789", &cert.serial_number, metadata)
                .unwrap();

            let expected = certus_key::digest(b"0123456789", DigestAlgorithm::Sha256);
            assert_eq!(record.document_digest, expected);
            assert_eq!(record.signature_algorithm, algorithm);
            assert_eq!(record.reason.as_deref(), Some("approval"));
            assert!(
                verify_signature(&cert.public_key, &record.document_digest, &record.signature)
                    .unwrap()
            );
        }
    }

    #[test]
    fn test_empty_document_rejected() {
        let f = fixture(Algorithm::Ed25519);
        let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
        let err = f
            .signing
            .sign_document(b"", &cert.serial_number, SigningMetadata::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let f = fixture(Algorithm::Ed25519);
        let serial = SerialNumber::parse("abcdef").unwrap();
        assert!(matches!(
            f.signing.sign_document(b"doc", &serial, SigningMetadata::default()),
            Err(PkiError::SignerCertificateInvalid { ref reason, .. }) if reason == "not registered"
        ));
    }

    #[test]
    fn test_revoked_signer_rejected() {
        let f = fixture(Algorithm::EcdsaP256Sha256);
        let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
        f.registry
            .revoke(&cert.serial_number, RevocationReason::KeyCompromise, now_seconds())
            .unwrap();
        assert!(matches!(
            f.signing.sign_document(b"doc", &cert.serial_number, SigningMetadata::default()),
            Err(PkiError::SignerCertificateInvalid { ref reason, .. }) if reason == "revoked"
        ));
    }

    #[test]
    fn test_expired_signer_rejected() {
        let f = fixture(Algorithm::Ed25519);
        let now = now_seconds();
        let expired = test_support::certificate_with_window(
            "7001",
            now - Duration::days(10),
            now - Duration::days(1),
        );
        f.registry.insert(expired.clone()).unwrap();
        assert!(matches!(
            f.signing.sign_document(b"doc", &expired.serial_number, SigningMetadata::default()),
            Err(PkiError::SignerCertificateInvalid { ref reason, .. }) if reason == "expired"
        ));
    }

    #[test]
    fn test_csr_certificate_has_no_signing_key() {
        let f = fixture(Algorithm::EcdsaP256Sha256);
        let requester = KeyPair::generate(Algorithm::EcdsaP256Sha256).unwrap();
        let pem = crate::csr::Csr::create(&requester, &SubjectName::new("external"))
            .unwrap()
            .to_pem()
            .unwrap();
        let cert = f.issuance.issue_from_csr(&pem, None).unwrap();
        assert_eq!(cert.key_origin, KeyOrigin::Csr);

        let err = f
            .signing
            .sign_document(b"doc", &cert.serial_number, SigningMetadata::default())
            .unwrap_err();
        assert!(matches!(err, PkiError::Key(certus_key::Error::KeyUnavailable(_))));
        assert!(f.keys.holds_key(&KeyRef::CaRoot).unwrap());
    }

    #[test]
    fn test_streamed_signature_matches_buffered() {
        let f = fixture(Algorithm::Ed25519);
        let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
        let document: Vec<u8> = (0..200_000u32).map(|i| (i % 7) as u8).collect();

        let streamed = f
            .signing
            .sign_reader(
                Cursor::new(&document),
                &cert.serial_number,
                SigningMetadata::default(),
                None,
            )
            .unwrap();
        let buffered = f
            .signing
            .sign_document(&document, &cert.serial_number, SigningMetadata::default())
            .unwrap();
        assert_eq!(streamed.document_digest, buffered.document_digest);
        // Ed25519 is deterministic
        assert_eq!(streamed.signature, buffered.signature);
    }

    #[test]
    fn test_cancelled_stream_stops() {
        let f = fixture(Algorithm::Ed25519);
        let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .signing
            .sign_reader(
                Cursor::new(vec![1u8; 1024]),
                &cert.serial_number,
                SigningMetadata::default(),
                Some(&cancel),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_record_json_shape() {
        let f = fixture(Algorithm::Ed25519);
        let cert = f.issuance.issue(&CertificateRequest::new("signer")).unwrap();
        let record = f
            .signing
            .sign_document(b"doc", &cert.serial_number, SigningMetadata::default())
            .unwrap();

        let json = record.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["digest_algorithm"], "sha256");
        assert_eq!(value["signature_algorithm"], "ed25519");
        assert_eq!(value["signer_certificate_serial"], cert.serial_number.as_str());
        assert!(value.get("reason").is_none());
        assert_eq!(SignatureRecord::from_json(&json).unwrap(), record);

        let mut truncated = value;
        let short_digest = hex::encode(&record.document_digest[..16]);
        truncated["document_digest"] = serde_json::json!(short_digest);
        assert!(matches!(
            SignatureRecord::from_json(&truncated.to_string()),
            Err(PkiError::InvalidRequest(_))
        ));
    }
}
