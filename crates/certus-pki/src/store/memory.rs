use std::{collections::HashMap, sync::RwLock};

use time::OffsetDateTime;

use super::{CertificateStore, RegistryEntry, RevocationEntry};
use crate::{
    cert::Certificate,
    error::{PkiError, Result},
    types::{truncate_to_seconds, RevocationReason, SerialNumber},
};

#[derive(Default)]
struct Inner {
    order: Vec<SerialNumber>,
    certificates: HashMap<SerialNumber, Certificate>,
    revocations: HashMap<SerialNumber, RevocationEntry>,
}

impl Inner {
    fn entry(&self, serial: &SerialNumber) -> Option<RegistryEntry> {
        self.certificates.get(serial).map(|certificate| RegistryEntry {
            certificate: certificate.clone(),
            revocation: self.revocations.get(serial).cloned(),
        })
    }
}

/// In-memory certificate registry
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateStore for MemoryStore {
    fn insert(&self, certificate: Certificate) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| PkiError::lock_poisoned())?;

        let serial = certificate.serial_number.clone();
        if inner.certificates.contains_key(&serial) {
            return Err(PkiError::DuplicateSerial(serial.to_string()));
        }

        inner.order.push(serial.clone());
        inner.certificates.insert(serial, certificate);
        Ok(())
    }

    fn get_by_serial(&self, serial: &SerialNumber) -> Result<RegistryEntry> {
        let inner = self.inner.read().map_err(|_| PkiError::lock_poisoned())?;
        inner
            .entry(serial)
            .ok_or_else(|| PkiError::NotFound(serial.to_string()))
    }

    fn revoke(
        &self,
        serial: &SerialNumber,
        reason: RevocationReason,
        revoked_at: OffsetDateTime,
    ) -> Result<RevocationEntry> {
        let mut inner = self.inner.write().map_err(|_| PkiError::lock_poisoned())?;

        if !inner.certificates.contains_key(serial) {
            return Err(PkiError::NotFound(serial.to_string()));
        }
        if inner.revocations.contains_key(serial) {
            return Err(PkiError::AlreadyRevoked(serial.to_string()));
        }

        let entry = RevocationEntry {
            serial_number: serial.clone(),
            reason,
            revoked_at: truncate_to_seconds(revoked_at),
        };
        inner.revocations.insert(serial.clone(), entry.clone());
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<RegistryEntry>> {
        let inner = self.inner.read().map_err(|_| PkiError::lock_poisoned())?;
        Ok(inner
            .order
            .iter()
            .filter_map(|serial| inner.entry(serial))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| PkiError::lock_poisoned())?;
        Ok(inner.order.len())
    }
}
