//! Certificate registry keyed by serial number

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    cert::Certificate,
    error::Result,
    types::{CertificateStatus, RevocationReason, SerialNumber},
};

/// 撤销记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevocationEntry {
    pub serial_number: SerialNumber,
    pub reason: RevocationReason,
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
}

/// A registered certificate with its revocation flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub certificate: Certificate,
    pub revocation: Option<RevocationEntry>,
}

impl RegistryEntry {
    /// Status at `now`. Revocation wins over expiry; status only moves forward.
    pub fn status_at(&self, now: OffsetDateTime) -> CertificateStatus {
        if let Some(revocation) = &self.revocation {
            return CertificateStatus::Revoked {
                reason: revocation.reason,
                revoked_at: revocation.revoked_at,
            };
        }
        if self.certificate.is_expired_at(now) {
            return CertificateStatus::Expired {
                expired_at: self.certificate.not_after,
            };
        }
        CertificateStatus::Active
    }
}

/// Storage backend for issued certificates (synchronous).
///
/// Records are immutable once inserted; the only mutation is the one-way
/// revocation flag. Implementations serialize writes and let reads run
/// concurrently.
pub trait CertificateStore: Send + Sync {
    /// Register a certificate; fails with `DuplicateSerial` if the serial is taken
    fn insert(&self, certificate: Certificate) -> Result<()>;

    /// Fails with `NotFound` for an unknown serial
    fn get_by_serial(&self, serial: &SerialNumber) -> Result<RegistryEntry>;

    /// Flag a certificate revoked; `NotFound` or `AlreadyRevoked` otherwise
    fn revoke(
        &self,
        serial: &SerialNumber,
        reason: RevocationReason,
        revoked_at: OffsetDateTime,
    ) -> Result<RevocationEntry>;

    /// Every entry in insertion order
    fn list(&self) -> Result<Vec<RegistryEntry>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Entries whose status at `now` is active, in insertion order
    fn list_active(&self, now: OffsetDateTime) -> Result<Vec<RegistryEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|entry| entry.status_at(now).is_active())
            .collect())
    }
}
