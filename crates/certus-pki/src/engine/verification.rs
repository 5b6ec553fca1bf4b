use std::{io::Read, sync::Arc};

use certus_key::{digest, digest_reader, CancellationToken};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::SignatureRecord;
use crate::{
    cert::{decode_pem, Certificate, SignedParts},
    error::{PkiError, Result},
    identity::KeyMaterial,
    store::{CertificateStore, RegistryEntry},
    types::{now_seconds, FailureReason, SerialNumber},
};

/// 验证结果
///
/// `reasons` lists every failed check in evaluation order; `valid` is true
/// exactly when it is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub signer_certificate_serial: SerialNumber,
    pub chain_valid: bool,
    pub revocation_checked: bool,
    pub reasons: Vec<FailureReason>,
}

impl VerificationResult {
    fn new(
        serial: SerialNumber,
        chain_valid: bool,
        revocation_checked: bool,
        reasons: Vec<FailureReason>,
    ) -> Self {
        Self {
            valid: reasons.is_empty(),
            signer_certificate_serial: serial,
            chain_valid,
            revocation_checked,
            reasons,
        }
    }
}

/// Checks signature records and presented certificates against the registry
/// and the CA trust anchors.
///
/// Trust failures come back as reasons on the result; `Err` is reserved for
/// failures of the CA itself (storage, corrupt records, cancellation).
pub struct VerificationEngine {
    keys: Arc<KeyMaterial>,
    registry: Arc<dyn CertificateStore>,
}

impl VerificationEngine {
    pub fn new(keys: Arc<KeyMaterial>, registry: Arc<dyn CertificateStore>) -> Self {
        Self { keys, registry }
    }

    pub fn verify(&self, document: &[u8], record: &SignatureRecord) -> Result<VerificationResult> {
        self.verify_at(document, record, now_seconds())
    }

    /// Verify as of `at`, which only affects the validity window check
    pub fn verify_at(
        &self,
        document: &[u8],
        record: &SignatureRecord,
        at: OffsetDateTime,
    ) -> Result<VerificationResult> {
        let computed = digest(document, record.digest_algorithm);
        self.evaluate(&computed, record, at)
    }

    /// Verify a document streamed from `reader`
    pub fn verify_reader<R: Read>(
        &self,
        reader: R,
        record: &SignatureRecord,
        cancel: Option<&CancellationToken>,
    ) -> Result<VerificationResult> {
        let (computed, _) = digest_reader(reader, record.digest_algorithm, cancel)?;
        self.evaluate(&computed, record, now_seconds())
    }

    fn evaluate(
        &self,
        computed_digest: &[u8],
        record: &SignatureRecord,
        at: OffsetDateTime,
    ) -> Result<VerificationResult> {
        let serial = &record.signer_certificate_serial;
        let mut reasons = Vec::new();

        if computed_digest != record.document_digest.as_slice() {
            reasons.push(FailureReason::DigestMismatch);
        }

        let Some(entry) = self.lookup(serial, &mut reasons)? else {
            return Ok(self.finish(serial.clone(), false, false, reasons));
        };
        let certificate = &entry.certificate;

        if entry.revocation.is_some() {
            reasons.push(FailureReason::CertificateRevoked);
        }
        if let Some(reason) = window_failure(certificate.not_before, certificate.not_after, at) {
            reasons.push(reason);
        }

        if !self.signature_matches(certificate, record) {
            reasons.push(FailureReason::SignatureInvalid);
        }

        let chain_valid = self.keys.issuer_of(&certificate.der)?.is_some();
        if !chain_valid {
            reasons.push(FailureReason::UntrustedIssuer);
        }

        Ok(self.finish(serial.clone(), chain_valid, true, reasons))
    }

    /// Check a certificate presented by a third party.
    ///
    /// The certificate must be one this CA registered, unrevoked, inside its
    /// validity window and signed by a trusted root.
    pub fn verify_presented_certificate(&self, pem: &str) -> Result<VerificationResult> {
        self.verify_presented_certificate_at(pem, now_seconds())
    }

    pub fn verify_presented_certificate_at(
        &self,
        pem: &str,
        at: OffsetDateTime,
    ) -> Result<VerificationResult> {
        let der = decode_pem(pem)?;
        let parts = SignedParts::decode(&der)?;
        let mut reasons = Vec::new();

        let mut revocation_checked = false;
        if let Some(entry) = self.lookup(&parts.serial, &mut reasons)? {
            if entry.certificate.der == der {
                revocation_checked = true;
                if entry.revocation.is_some() {
                    reasons.push(FailureReason::CertificateRevoked);
                }
            } else {
                // same serial, different certificate
                reasons.push(FailureReason::UnknownSigner);
            }
        }
        if let Some(reason) = window_failure(parts.not_before, parts.not_after, at) {
            reasons.push(reason);
        }

        let chain_valid = self.keys.issuer_of(&der)?.is_some();
        if !chain_valid {
            reasons.push(FailureReason::UntrustedIssuer);
        }

        Ok(self.finish(parts.serial, chain_valid, revocation_checked, reasons))
    }

    fn lookup(
        &self,
        serial: &SerialNumber,
        reasons: &mut Vec<FailureReason>,
    ) -> Result<Option<RegistryEntry>> {
        match self.registry.get_by_serial(serial) {
            Ok(entry) => Ok(Some(entry)),
            Err(PkiError::NotFound(_)) => {
                reasons.push(FailureReason::UnknownSigner);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn signature_matches(&self, certificate: &Certificate, record: &SignatureRecord) -> bool {
        if record.signature_algorithm != certificate.public_key_algorithm {
            return false;
        }
        let verified = self
            .keys
            .verify(&certificate.public_key, &record.document_digest, &record.signature);
        match verified {
            Ok(matches) => matches,
            Err(e) => {
                warn!(
                    serial = %certificate.serial_number,
                    error = %e,
                    "registered public key unusable"
                );
                false
            }
        }
    }

    fn finish(
        &self,
        serial: SerialNumber,
        chain_valid: bool,
        revocation_checked: bool,
        reasons: Vec<FailureReason>,
    ) -> VerificationResult {
        if reasons.is_empty() {
            debug!(%serial, "verification passed");
        } else {
            warn!(%serial, ?reasons, "verification failed");
        }
        VerificationResult::new(serial, chain_valid, revocation_checked, reasons)
    }
}

fn window_failure(
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    at: OffsetDateTime,
) -> Option<FailureReason> {
    if at > not_after {
        Some(FailureReason::CertificateExpired)
    } else if at < not_before {
        Some(FailureReason::CertificateNotYetValid)
    } else {
        None
    }
}
