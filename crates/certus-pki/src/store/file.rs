use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

use time::OffsetDateTime;
use tracing::warn;

use super::{CertificateStore, RegistryEntry, RevocationEntry};
use crate::{
    cert::Certificate,
    error::{PkiError, Result},
    types::{truncate_to_seconds, RevocationReason, SerialNumber},
};

const INDEX_FILE: &str = "index";

/// Directory-backed registry.
///
/// Layout, per serial:
/// - `<serial>.json`: the immutable record, created with create-new semantics
/// - `<serial>.pem`: the certificate artifact
/// - `<serial>.revoked.json`: revocation flag, written via temp file + rename
///
/// plus an append-only `index` with one serial per line in insertion order.
pub struct FileStore {
    root: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, serial: &SerialNumber) -> PathBuf {
        self.root.join(format!("{serial}.json"))
    }

    fn pem_path(&self, serial: &SerialNumber) -> PathBuf {
        self.root.join(format!("{serial}.pem"))
    }

    fn revocation_path(&self, serial: &SerialNumber) -> PathBuf {
        self.root.join(format!("{serial}.revoked.json"))
    }

    fn write_new_record(&self, mut record: File, certificate: &Certificate) -> Result<()> {
        record.write_all(&serde_json::to_vec_pretty(certificate)?)?;
        record.sync_all()?;

        fs::write(self.pem_path(&certificate.serial_number), certificate.to_pem())?;
        self.append_index(&certificate.serial_number)
    }

    /// Append one index line; a failed append is truncated away again
    fn append_index(&self, serial: &SerialNumber) -> Result<()> {
        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(INDEX_FILE))?;
        let committed = index.metadata()?.len();

        let appended = writeln!(index, "{serial}").and_then(|()| index.sync_all());
        if let Err(e) = appended {
            if let Err(rollback) = index.set_len(committed) {
                warn!(%serial, error = %rollback, "could not roll back index line");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn read_entry(&self, serial: &SerialNumber) -> Result<RegistryEntry> {
        let record = match fs::read(self.record_path(serial)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PkiError::NotFound(serial.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let certificate: Certificate = serde_json::from_slice(&record)?;

        let revocation = match fs::read(self.revocation_path(serial)) {
            Ok(bytes) => Some(serde_json::from_slice::<RevocationEntry>(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(RegistryEntry {
            certificate,
            revocation,
        })
    }

    fn index(&self) -> Result<Vec<SerialNumber>> {
        let contents = match fs::read_to_string(self.root.join(INDEX_FILE)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(SerialNumber::parse)
            .collect()
    }
}

impl CertificateStore for FileStore {
    fn insert(&self, certificate: Certificate) -> Result<()> {
        let _guard = self.lock.write().map_err(|_| PkiError::lock_poisoned())?;

        let serial = certificate.serial_number.clone();
        let record_path = self.record_path(&serial);
        let record = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&record_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PkiError::DuplicateSerial(serial.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.write_new_record(record, &certificate) {
            // nothing half-written may stay visible
            for path in [record_path, self.pem_path(&serial)] {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => warn!(path = %path.display(), error = %err, "could not clean up"),
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn get_by_serial(&self, serial: &SerialNumber) -> Result<RegistryEntry> {
        let _guard = self.lock.read().map_err(|_| PkiError::lock_poisoned())?;
        self.read_entry(serial)
    }

    fn revoke(
        &self,
        serial: &SerialNumber,
        reason: RevocationReason,
        revoked_at: OffsetDateTime,
    ) -> Result<RevocationEntry> {
        let _guard = self.lock.write().map_err(|_| PkiError::lock_poisoned())?;

        if !self.record_path(serial).exists() {
            return Err(PkiError::NotFound(serial.to_string()));
        }
        let revocation_path = self.revocation_path(serial);
        if revocation_path.exists() {
            return Err(PkiError::AlreadyRevoked(serial.to_string()));
        }

        let entry = RevocationEntry {
            serial_number: serial.clone(),
            reason,
            revoked_at: truncate_to_seconds(revoked_at),
        };
        let tmp_path = self.root.join(format!(".{serial}.revoked.json.tmp"));
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&serde_json::to_vec_pretty(&entry)?)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &revocation_path)?;

        Ok(entry)
    }

    fn list(&self) -> Result<Vec<RegistryEntry>> {
        let _guard = self.lock.read().map_err(|_| PkiError::lock_poisoned())?;

        let mut entries = Vec::new();
        for serial in self.index()? {
            match self.read_entry(&serial) {
                Ok(entry) => entries.push(entry),
                Err(PkiError::NotFound(_)) => {
                    warn!(%serial, "index names a serial without a record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    fn len(&self) -> Result<usize> {
        let _guard = self.lock.read().map_err(|_| PkiError::lock_poisoned())?;
        let index = self.index()?;
        Ok(index
            .iter()
            .filter(|serial| self.record_path(serial).exists())
            .count())
    }
}
