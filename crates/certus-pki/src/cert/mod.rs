//! Certificate model: subject profiles, X.509 encoding and the issued
//! certificate record kept by the registry.

pub mod name;
pub mod subject;
pub mod x509;

use certus_key::{sha256_hex, Algorithm};
use der::{Decode, Encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_cert::certificate::{Certificate as X509Certificate, Version};

pub use self::{
    subject::{CertificateRequest, SubjectAltName, SubjectName},
    x509::{key_identifier, SignedParts},
};
use crate::{
    error::{PkiError, Result},
    types::{hex_bytes, KeyOrigin, SerialNumber},
};

const PEM_TAG: &str = "CERTIFICATE";

/// An issued certificate as held by the registry.
///
/// Every field mirrors the DER in `der`; the record is built by decoding
/// that DER so the two cannot drift apart. Status is not part of the
/// record, see [`crate::store::RegistryEntry::status_at`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub serial_number: SerialNumber,
    pub version: u8,
    pub subject: SubjectName,
    pub issuer: SubjectName,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub signature_algorithm: Algorithm,
    pub public_key_algorithm: Algorithm,
    /// SubjectPublicKeyInfo DER
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default)]
    pub subject_alt_names: Vec<SubjectAltName>,
    /// Complete X.509 DER encoding
    #[serde(with = "hex_bytes")]
    pub der: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    pub key_origin: KeyOrigin,
}

impl Certificate {
    /// Decode a DER certificate signed with an algorithm this CA supports
    pub fn from_der(der: &[u8], key_origin: KeyOrigin) -> Result<Self> {
        let certificate = X509Certificate::from_der(der)
            .map_err(|e| PkiError::InvalidRequest(format!("not a DER certificate: {e}")))?;
        let tbs = &certificate.tbs_certificate;

        let version = match tbs.version {
            Version::V1 => 1,
            Version::V2 => 2,
            Version::V3 => 3,
        };
        let not_before = x509::from_x509_time(&tbs.validity.not_before)?;

        Ok(Self {
            serial_number: SerialNumber::from_bytes(tbs.serial_number.as_bytes())?,
            version,
            subject: name::parse_name(&tbs.subject)?,
            issuer: name::parse_name(&tbs.issuer)?,
            not_before,
            not_after: x509::from_x509_time(&tbs.validity.not_after)?,
            signature_algorithm: Algorithm::from_signature_oid(
                &certificate.signature_algorithm.oid,
            )?,
            public_key_algorithm: Algorithm::from_spki_oid(
                &tbs.subject_public_key_info.algorithm.oid,
            )?,
            public_key: tbs.subject_public_key_info.to_der()?,
            subject_alt_names: x509::subject_alt_names(tbs)?,
            der: der.to_vec(),
            issued_at: not_before,
            key_origin,
        })
    }

    /// Decode a PEM `CERTIFICATE` block
    pub fn from_pem(pem: &str, key_origin: KeyOrigin) -> Result<Self> {
        Self::from_der(&decode_pem(pem)?, key_origin)
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PEM_TAG, self.der.clone()))
    }

    /// SHA-256 over the DER encoding, lowercase hex
    pub fn thumbprint(&self) -> String {
        sha256_hex(&self.der)
    }

    /// SubjectKeyIdentifier value of this certificate's key
    pub fn key_id(&self) -> Vec<u8> {
        key_identifier(&self.public_key)
    }

    /// `not_before <= at <= not_after`
    pub fn is_within_validity(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn is_expired_at(&self, at: OffsetDateTime) -> bool {
        at > self.not_after
    }

    /// Whether this certificate was signed by `issuer`
    pub fn is_issued_by(&self, issuer: &Certificate) -> Result<bool> {
        SignedParts::decode(&self.der)?.is_signed_by(
            &issuer.der,
            &issuer.public_key,
            issuer.public_key_algorithm,
        )
    }
}

/// Extract the DER payload of a PEM `CERTIFICATE` block
pub fn decode_pem(input: &str) -> Result<Vec<u8>> {
    let block = pem::parse(input)
        .map_err(|e| PkiError::InvalidRequest(format!("Failed to parse PEM: {e}")))?;
    if block.tag() != PEM_TAG {
        return Err(PkiError::InvalidRequest(format!(
            "Invalid PEM tag {:?}, expected {PEM_TAG}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}
