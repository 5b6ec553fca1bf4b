use thiserror::Error;

use crate::algorithm::Algorithm;

/// Errors raised by key handling, signing and key storage.
#[derive(Error, Debug)]
pub enum Error {
    /// No key is held for the requested reference
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    /// A key with the same handle is already stored
    #[error("Key already exists: {0}")]
    KeyExists(String),

    /// The request names an algorithm the key was not created with
    #[error("Unsupported algorithm: requested {requested}, key uses {available}")]
    UnsupportedAlgorithm {
        requested: Algorithm,
        available: Algorithm,
    },

    /// Signing input was empty
    #[error("Refusing to sign empty input")]
    EmptyInput,

    /// Streaming work stopped because its cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Key generation, import or export failed
    #[error("Key error: {0}")]
    KeyError(String),

    /// Signature creation or decoding failed
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// DER/PEM/hex/JSON encoding failed
    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn key_not_found(handle: impl std::fmt::Display) -> Self {
        Error::KeyUnavailable(format!("no key stored under {handle}"))
    }

    pub fn key_exists(handle: impl std::fmt::Display) -> Self {
        Error::KeyExists(handle.to_string())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Error::EncodingError(format!("Serialization error: {err}"))
    }

    pub fn encryption(err: impl std::fmt::Display) -> Self {
        Error::KeyError(format!("Encryption error: {err}"))
    }

    pub fn decryption(err: impl std::fmt::Display) -> Self {
        Error::KeyError(format!("Decryption error: {err}"))
    }

    pub fn invalid_configuration(msg: impl std::fmt::Display) -> Self {
        Error::Other(format!("Invalid configuration: {msg}"))
    }

    pub fn lock_poisoned() -> Self {
        Error::Other("key store lock poisoned".to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err)
    }
}

impl From<pkcs8::Error> for Error {
    fn from(err: pkcs8::Error) -> Self {
        Error::KeyError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for Error {
    fn from(err: pkcs8::spki::Error) -> Self {
        Error::EncodingError(err.to_string())
    }
}
