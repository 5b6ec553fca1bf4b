//! Certus key handling
//!
//! Signing keys, digests, signature verification and key storage used by the
//! certus certificate authority.

pub mod algorithm;
pub mod cancel;
pub mod error;
pub mod hash;
pub mod keypair;
pub mod store;
pub mod verify;

pub use algorithm::Algorithm;
pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use hash::{digest, digest_reader, sha256_hex, DigestAlgorithm, STREAM_CHUNK_SIZE};
pub use keypair::KeyPair;
// Re-export store types
pub use store::{
    create_key_store, FileKeyStore, KeyHandle, KeyMetadata, KeyStore, KeyStoreConfig,
    MemoryKeyStore,
};
pub use verify::{spki_algorithm, verify_signature};
