//! Certificate Signing Request (CSR) module
//!
//! PKCS#10 requests accepted by CSR-based issuance. Requests are parsed,
//! their self-signature is checked against the embedded public key, and the
//! subject is mapped onto [`SubjectName`].

use certus_key::{verify_signature, Algorithm, KeyPair};
use der::{asn1::BitString, Decode, Encode};
use serde::{Deserialize, Serialize};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::{
    cert::{name, SubjectName},
    error::{PkiError, Result},
};

/// Certificate Signing Request
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

/// Summary of a parsed CSR, for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrSummary {
    pub subject: SubjectName,
    pub algorithm: Algorithm,
}

impl Csr {
    /// Create and sign a request for `key`.
    ///
    /// The CA never needs this itself; it exists for requesters and tests.
    pub fn create(key: &KeyPair, subject: &SubjectName) -> Result<Self> {
        let public_key = spki::SubjectPublicKeyInfoOwned::from_der(&key.public_key_der()?)
            .map_err(|e| PkiError::InvalidRequest(format!("Failed to parse SPKI: {e}")))?;

        let info = CertReqInfo {
            version: Version::V1,
            subject: name::build_name(subject)?,
            public_key,
            attributes: Default::default(),
        };

        let info_der = info.to_der()?;
        let signature = key.sign(&info_der)?;

        Ok(Self {
            inner: CertReq {
                info,
                algorithm: key.algorithm().signature_algorithm_id(),
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }

    /// Parse CSR from PEM format
    pub fn from_pem(pem: &str) -> Result<Self> {
        let block = pem::parse(pem)
            .map_err(|e| PkiError::InvalidRequest(format!("Failed to parse PEM: {e}")))?;

        if block.tag() != "CERTIFICATE REQUEST" && block.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(PkiError::InvalidRequest(
                "Invalid PEM tag, expected CERTIFICATE REQUEST or NEW CERTIFICATE REQUEST"
                    .to_string(),
            ));
        }

        Self::from_der(block.contents())
    }

    /// Parse CSR from DER format
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| PkiError::InvalidRequest(format!("Failed to parse CSR DER: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", self.to_der()?)))
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn subject(&self) -> Result<SubjectName> {
        name::parse_name(&self.inner.info.subject)
    }

    /// Requester public key as SPKI DER
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.info.public_key.to_der()?)
    }

    /// Key algorithm of the requester
    pub fn algorithm(&self) -> Result<Algorithm> {
        Ok(Algorithm::from_spki_oid(&self.inner.info.public_key.algorithm.oid)?)
    }

    /// Verify the self-signature with the embedded public key
    pub fn verify_signature(&self) -> Result<()> {
        let key_algorithm = self.algorithm()?;
        let signature_algorithm = Algorithm::from_signature_oid(&self.inner.algorithm.oid)
            .map_err(|e| PkiError::InvalidRequest(e.to_string()))?;
        if key_algorithm != signature_algorithm {
            return Err(PkiError::InvalidRequest(format!(
                "signature algorithm {signature_algorithm} does not match key algorithm \
                 {key_algorithm}"
            )));
        }

        let info_der = self.inner.info.to_der()?;
        let valid = verify_signature(
            &self.public_key_der()?,
            &info_der,
            self.inner.signature.raw_bytes(),
        )
        .map_err(|e| PkiError::InvalidRequest(format!("unusable CSR public key: {e}")))?;

        if valid {
            Ok(())
        } else {
            Err(PkiError::InvalidRequest(
                "CSR signature verification failed".to_string(),
            ))
        }
    }

    pub fn summary(&self) -> Result<CsrSummary> {
        Ok(CsrSummary {
            subject: self.subject()?,
            algorithm: self.algorithm()?,
        })
    }
}
