use std::fmt;

use p256::ecdsa::{signature::Signer, Signature as P256Signature, SigningKey as P256SigningKey};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::{
    algorithm::Algorithm,
    error::{Error, Result},
};

/// A private signing key held by the CA process.
///
/// The secret half never leaves this type except as PKCS#8 DER handed to a
/// [`KeyStore`](crate::store::KeyStore). `Debug` output is redacted.
pub enum KeyPair {
    P256(p256::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl KeyPair {
    /// Generate a fresh key pair for `algorithm`
    pub fn generate(algorithm: Algorithm) -> Result<Self> {
        let key = match algorithm {
            Algorithm::EcdsaP256Sha256 => KeyPair::P256(p256::SecretKey::random(&mut OsRng)),
            Algorithm::Ed25519 => KeyPair::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng)),
        };
        Ok(key)
    }

    /// Import from PKCS#8 DER, detecting the algorithm from the encoding
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(secret) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(KeyPair::P256(secret));
        }
        ed25519_dalek::SigningKey::from_pkcs8_der(der)
            .map(KeyPair::Ed25519)
            .map_err(|e| Error::KeyError(format!("PKCS8 DER import failed: {e}")))
    }

    /// Export the private key as PKCS#8 DER, for key stores only
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            KeyPair::P256(secret) => secret.to_pkcs8_der()?,
            KeyPair::Ed25519(signing) => signing.to_pkcs8_der()?,
        };
        Ok(doc.as_bytes().to_vec())
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyPair::P256(_) => Algorithm::EcdsaP256Sha256,
            KeyPair::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    /// Public key as SubjectPublicKeyInfo DER
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            KeyPair::P256(secret) => secret.public_key().to_public_key_der()?,
            KeyPair::Ed25519(signing) => signing.verifying_key().to_public_key_der()?,
        };
        Ok(doc.as_bytes().to_vec())
    }

    /// SHA-256 over the SPKI DER
    pub fn fingerprint_sha256_spki(&self) -> Result<[u8; 32]> {
        Ok(Sha256::digest(self.public_key_der()?).into())
    }

    /// Key identifier used for SubjectKeyIdentifier / AuthorityKeyIdentifier
    /// (leftmost 160 bits of the SPKI SHA-256 fingerprint)
    pub fn key_id(&self) -> Result<Vec<u8>> {
        Ok(self.fingerprint_sha256_spki()?[..20].to_vec())
    }

    /// Sign `message`.
    ///
    /// P-256 hashes with SHA-256 and returns an ASN.1 DER signature, Ed25519
    /// returns the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        if message.is_empty() {
            return Err(Error::EmptyInput);
        }
        let signature = match self {
            KeyPair::P256(secret) => {
                let signing_key = P256SigningKey::from(secret);
                let signature: P256Signature = signing_key
                    .try_sign(message)
                    .map_err(|e| Error::SignatureError(format!("P-256 signing failed: {e}")))?;
                signature.to_der().as_bytes().to_vec()
            }
            KeyPair::Ed25519(signing) => signing.sign(message).to_bytes().to_vec(),
        };
        Ok(signature)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("secret", &"<redacted>")
            .finish()
    }
}
