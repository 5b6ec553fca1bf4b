use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{PkiError, Result};

/// Longest serial accepted (RFC 5280 §4.1.2.2)
const MAX_SERIAL_BYTES: usize = 20;

/// 证书序列号
///
/// Big-endian positive integer without leading zero bytes, rendered as
/// lowercase hex. Parsing accepts upper case and `:`-separated octets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let trimmed = &bytes[start..];
        if trimmed.is_empty() {
            return Err(PkiError::InvalidSerial("serial must be non-zero".to_string()));
        }
        if trimmed.len() > MAX_SERIAL_BYTES {
            return Err(PkiError::InvalidSerial(format!(
                "serial longer than {MAX_SERIAL_BYTES} bytes"
            )));
        }
        if trimmed[0] & 0x80 != 0 && trimmed.len() == MAX_SERIAL_BYTES {
            return Err(PkiError::InvalidSerial(
                "serial does not fit a positive 20-byte integer".to_string(),
            ));
        }
        Ok(Self(hex::encode(trimmed)))
    }

    /// Parse a hex serial.
    ///
    /// Input is always hex: a decimal rendering such as `255` names serial
    /// `0x0255`, not `0xff`. Convert decimal serials before passing them in.
    pub fn parse(input: &str) -> Result<Self> {
        let cleaned: String = input.trim().chars().filter(|c| *c != ':').collect();
        if cleaned.is_empty() {
            return Err(PkiError::InvalidSerial("empty serial".to_string()));
        }
        let padded = if cleaned.len() % 2 == 1 {
            format!("0{cleaned}")
        } else {
            cleaned
        };
        let bytes = hex::decode(&padded)
            .map_err(|e| PkiError::InvalidSerial(format!("{input:?} is not hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Minimal big-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        // the inner string is always valid hex
        hex::decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SerialNumber {
    type Error = PkiError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SerialNumber> for String {
    fn from(serial: SerialNumber) -> Self {
        serial.0
    }
}

/// 撤销原因 (RFC 5280 CRLReason)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationReason {
    /// 未指定
    #[default]
    Unspecified,
    /// 密钥泄露
    KeyCompromise,
    /// CA密钥泄露
    CaCompromise,
    /// 从属关系改变
    AffiliationChanged,
    /// 被取代
    Superseded,
    /// 停止操作
    CessationOfOperation,
    /// 特权撤销
    PrivilegeWithdrawn,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "key-compromise",
            RevocationReason::CaCompromise => "ca-compromise",
            RevocationReason::AffiliationChanged => "affiliation-changed",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessation-of-operation",
            RevocationReason::PrivilegeWithdrawn => "privilege-withdrawn",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        [
            RevocationReason::Unspecified,
            RevocationReason::KeyCompromise,
            RevocationReason::CaCompromise,
            RevocationReason::AffiliationChanged,
            RevocationReason::Superseded,
            RevocationReason::CessationOfOperation,
            RevocationReason::PrivilegeWithdrawn,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == normalized)
        .ok_or_else(|| PkiError::InvalidRequest(format!("unknown revocation reason: {s}")))
    }
}

/// 证书状态
///
/// Computed at read time from the stored revocation entry and the clock;
/// never stored on the certificate itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificateStatus {
    /// 有效
    Active,
    /// 已撤销
    Revoked {
        reason: RevocationReason,
        #[serde(with = "time::serde::rfc3339")]
        revoked_at: OffsetDateTime,
    },
    /// 已过期
    Expired {
        #[serde(with = "time::serde::rfc3339")]
        expired_at: OffsetDateTime,
    },
}

impl CertificateStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, CertificateStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Revoked { .. } => "revoked",
            CertificateStatus::Expired { .. } => "expired",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who holds the private key of an issued certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrigin {
    /// Generated at issuance and held in the CA key store
    Generated,
    /// Supplied by the requester through a CSR
    Csr,
}

/// A single finding of a verification run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureReason {
    DigestMismatch,
    UnknownSigner,
    CertificateRevoked,
    CertificateExpired,
    CertificateNotYetValid,
    SignatureInvalid,
    UntrustedIssuer,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::DigestMismatch => "DigestMismatch",
            FailureReason::UnknownSigner => "UnknownSigner",
            FailureReason::CertificateRevoked => "CertificateRevoked",
            FailureReason::CertificateExpired => "CertificateExpired",
            FailureReason::CertificateNotYetValid => "CertificateNotYetValid",
            FailureReason::SignatureInvalid => "SignatureInvalid",
            FailureReason::UntrustedIssuer => "UntrustedIssuer",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop sub-second precision; X.509 times carry whole seconds only.
pub fn truncate_to_seconds(t: OffsetDateTime) -> OffsetDateTime {
    t - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// Current UTC time at X.509 precision
pub fn now_seconds() -> OffsetDateTime {
    truncate_to_seconds(OffsetDateTime::now_utc())
}

/// Serde adapter storing byte fields as lowercase hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
