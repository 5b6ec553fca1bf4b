use std::{fmt, str::FromStr};

use const_oid::{db::rfc5912, db::rfc8410, ObjectIdentifier};
use serde::{Deserialize, Serialize};
use spki::AlgorithmIdentifierOwned;

use crate::error::{Error, Result};

/// Signature algorithm a CA identity is created with.
///
/// Fixed at CA initialization; every key the CA generates afterwards
/// (including per-certificate keys) uses the same algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// ECDSA over NIST P-256 with SHA-256, DER encoded signatures
    #[default]
    EcdsaP256Sha256,
    /// Ed25519 (pure EdDSA)
    Ed25519,
}

impl Algorithm {
    /// Human readable algorithm name as shown in certificate listings
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::EcdsaP256Sha256 => "SHA256withECDSA",
            Algorithm::Ed25519 => "Ed25519",
        }
    }

    /// Public key algorithm name
    pub fn key_algorithm_name(&self) -> &'static str {
        match self {
            Algorithm::EcdsaP256Sha256 => "EC",
            Algorithm::Ed25519 => "Ed25519",
        }
    }

    /// OID placed in the `signatureAlgorithm` field of certificates
    pub fn signature_oid(&self) -> ObjectIdentifier {
        match self {
            Algorithm::EcdsaP256Sha256 => rfc5912::ECDSA_WITH_SHA_256,
            Algorithm::Ed25519 => rfc8410::ID_ED_25519,
        }
    }

    /// AlgorithmIdentifier for X.509 / PKCS#10 signature fields.
    ///
    /// Both algorithms omit parameters (RFC 5758 §3.2, RFC 8410 §3).
    pub fn signature_algorithm_id(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.signature_oid(),
            parameters: None,
        }
    }

    /// Map a signature algorithm OID back to an algorithm
    pub fn from_signature_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == rfc5912::ECDSA_WITH_SHA_256 {
            Ok(Algorithm::EcdsaP256Sha256)
        } else if *oid == rfc8410::ID_ED_25519 {
            Ok(Algorithm::Ed25519)
        } else {
            Err(Error::SignatureError(format!(
                "unsupported signature algorithm OID {oid}"
            )))
        }
    }

    /// Map an SPKI algorithm OID to an algorithm
    pub fn from_spki_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == rfc5912::ID_EC_PUBLIC_KEY {
            Ok(Algorithm::EcdsaP256Sha256)
        } else if *oid == rfc8410::ID_ED_25519 {
            Ok(Algorithm::Ed25519)
        } else {
            Err(Error::KeyError(format!("unsupported public key OID {oid}")))
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ecdsa-p256-sha256" | "p256" | "p-256" | "sha256withecdsa" => {
                Ok(Algorithm::EcdsaP256Sha256)
            }
            "ed25519" => Ok(Algorithm::Ed25519),
            other => Err(Error::KeyError(format!("unknown algorithm: {other}"))),
        }
    }
}
