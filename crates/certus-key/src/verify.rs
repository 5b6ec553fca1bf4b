use p256::ecdsa::{
    signature::Verifier, Signature as P256Signature, VerifyingKey as P256VerifyingKey,
};
use pkcs8::DecodePublicKey;
use spki::{der::Decode, SubjectPublicKeyInfoOwned};

use crate::{
    algorithm::Algorithm,
    error::{Error, Result},
};

/// Algorithm of a SubjectPublicKeyInfo DER blob
pub fn spki_algorithm(spki_der: &[u8]) -> Result<Algorithm> {
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| Error::EncodingError(format!("Failed to parse SPKI: {e}")))?;
    Algorithm::from_spki_oid(&spki.algorithm.oid)
}

/// Verify `signature` over `message` with the public key in `spki_der`.
///
/// Returns `Ok(false)` for a well-formed key whose signature does not match,
/// including a signature that fails to decode. Returns `Err` only when the
/// key itself cannot be used.
pub fn verify_signature(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    match spki_algorithm(spki_der)? {
        Algorithm::EcdsaP256Sha256 => {
            let public_key = p256::PublicKey::from_public_key_der(spki_der)
                .map_err(|e| Error::KeyError(format!("Invalid P-256 public key: {e}")))?;
            let verifying_key = P256VerifyingKey::from(&public_key);
            let Ok(signature) = P256Signature::from_der(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(message, &signature).is_ok())
        }
        Algorithm::Ed25519 => {
            let verifying_key = ed25519_dalek::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| Error::KeyError(format!("Invalid Ed25519 public key: {e}")))?;
            let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(message, &signature).is_ok())
        }
    }
}
