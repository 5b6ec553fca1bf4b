use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    cancel::CancellationToken,
    error::{Error, Result},
};

/// Chunk size used when digesting readers
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithm used for document digests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
        }
    }
}

/// Digest an in-memory buffer
pub fn digest(data: &[u8], algorithm: DigestAlgorithm) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
    }
}

/// Digest a reader without holding it in memory.
///
/// Reads in [`STREAM_CHUNK_SIZE`] chunks and checks `cancel` before each
/// read. Returns the digest together with the number of bytes consumed.
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithm: DigestAlgorithm,
    cancel: Option<&CancellationToken>,
) -> Result<(Vec<u8>, u64)> {
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let mut total = 0u64;
    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(Error::Cancelled);
                }
                let read = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                hasher.update(&buffer[..read]);
                total += read as u64;
            }
            Ok((hasher.finalize().to_vec(), total))
        }
    }
}

/// SHA-256 thumbprint rendered as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest(data, DigestAlgorithm::Sha256))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_reader_matches_buffer_digest() {
        // spans several chunks and ends mid-chunk
        let data: Vec<u8> = (0..STREAM_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let (streamed, len) =
            digest_reader(Cursor::new(&data), DigestAlgorithm::Sha256, None).unwrap();
        assert_eq!(streamed, digest(&data, DigestAlgorithm::Sha256));
        assert_eq!(len, data.len() as u64);
    }

    #[test]
    fn test_cancelled_token_stops_digest() {
        let token = CancellationToken::new();
        token.cancel();
        let result =
            digest_reader(Cursor::new(vec![1u8; 10]), DigestAlgorithm::Sha256, Some(&token));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_known_sha256_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
