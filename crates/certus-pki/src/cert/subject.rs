use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

/// Longest CN / O / OU accepted
pub const MAX_NAME_LEN: usize = 64;
/// Longest state / locality accepted
pub const MAX_PLACE_LEN: usize = 128;

const MAX_DNS_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_EMAIL_LOCAL_LEN: usize = 64;

/// 证书主体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectName {
    /// Common Name (CN)
    pub common_name: String,
    /// Organization (O)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Organizational Unit (OU)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    /// Country (C), two letters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// State or Province (ST)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Locality (L)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    /// emailAddress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SubjectName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    /// Trim every field and drop optional fields that are blank.
    pub fn normalized(&self) -> Self {
        fn opt(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            common_name: self.common_name.trim().to_string(),
            organization: opt(&self.organization),
            organizational_unit: opt(&self.organizational_unit),
            country: opt(&self.country),
            state: opt(&self.state),
            locality: opt(&self.locality),
            email: opt(&self.email),
        }
    }

    /// Check field rules, naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(PkiError::invalid_subject("common_name", "must not be empty"));
        }
        check_text("common_name", &self.common_name, MAX_NAME_LEN)?;

        if let Some(organization) = &self.organization {
            check_text("organization", organization, MAX_NAME_LEN)?;
        }
        if let Some(unit) = &self.organizational_unit {
            check_text("organizational_unit", unit, MAX_NAME_LEN)?;
        }
        if let Some(country) = &self.country {
            if country.chars().count() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(PkiError::invalid_subject(
                    "country",
                    format!("must be exactly 2 letters, got {country:?}"),
                ));
            }
        }
        if let Some(state) = &self.state {
            check_text("state", state, MAX_PLACE_LEN)?;
        }
        if let Some(locality) = &self.locality {
            check_text("locality", locality, MAX_PLACE_LEN)?;
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(PkiError::invalid_subject(
                    "email",
                    format!("{email:?} is not a valid email address"),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CN={}", self.common_name)?;
        let optional = [
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
            ("C", &self.country),
            ("ST", &self.state),
            ("L", &self.locality),
            ("E", &self.email),
        ];
        for (label, value) in optional {
            if let Some(value) = value {
                write!(f, ", {label}={value}")?;
            }
        }
        Ok(())
    }
}

fn check_text(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PkiError::invalid_subject(field, "must not be blank"));
    }
    let len = value.chars().count();
    if len > max {
        return Err(PkiError::invalid_subject(
            field,
            format!("{len} characters exceeds the limit of {max}"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(PkiError::invalid_subject(field, "contains control characters"));
    }
    Ok(())
}

/// Subject profile submitted for issuance
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateRequest {
    #[serde(flatten)]
    pub subject: SubjectName,
    /// Untyped entries are classified as IP, email (contains `@`) or DNS;
    /// `DNS:`, `email:` and `IP:` prefixes force a type.
    #[serde(default)]
    pub subject_alt_names: Vec<String>,
    /// Falls back to the CA's default validity when absent
    #[serde(default)]
    pub validity_days: Option<u32>,
}

impl CertificateRequest {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            subject: SubjectName::new(common_name),
            ..Default::default()
        }
    }
}

/// A typed subjectAltName entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubjectAltName {
    Dns(String),
    Email(String),
    Ip(IpAddr),
}

impl SubjectAltName {
    pub fn parse(input: &str) -> Result<Self> {
        let value = input.trim();
        if value.is_empty() {
            return Err(PkiError::invalid_san(input, "empty entry"));
        }

        if let Some(rest) = strip_prefix_ignore_case(value, "dns:") {
            return Self::dns(rest);
        }
        if let Some(rest) = strip_prefix_ignore_case(value, "email:") {
            return Self::email(rest);
        }
        if let Some(rest) = strip_prefix_ignore_case(value, "ip:") {
            return rest
                .trim()
                .parse::<IpAddr>()
                .map(SubjectAltName::Ip)
                .map_err(|e| PkiError::invalid_san(input, e.to_string()));
        }

        if let Ok(ip) = value.parse::<IpAddr>() {
            Ok(SubjectAltName::Ip(ip))
        } else if value.contains('@') {
            Self::email(value)
        } else {
            Self::dns(value)
        }
    }

    fn dns(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        if !is_valid_dns_name(&value, true) {
            return Err(PkiError::invalid_san(&value, "not a valid DNS name"));
        }
        Ok(SubjectAltName::Dns(value))
    }

    fn email(value: &str) -> Result<Self> {
        let value = value.trim();
        if !is_valid_email(value) {
            return Err(PkiError::invalid_san(value, "not a valid email address"));
        }
        Ok(SubjectAltName::Email(value.to_string()))
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltName::Dns(name) => write!(f, "DNS:{name}"),
            SubjectAltName::Email(email) => write!(f, "email:{email}"),
            SubjectAltName::Ip(ip) => write!(f, "IP:{ip}"),
        }
    }
}

impl FromStr for SubjectAltName {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SubjectAltName {
    type Error = PkiError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SubjectAltName> for String {
    fn from(san: SubjectAltName) -> Self {
        san.to_string()
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Hostname check (RFC 1123 labels); `allow_wildcard` permits one leading `*.`
pub fn is_valid_dns_name(name: &str, allow_wildcard: bool) -> bool {
    let name = match name.strip_prefix("*.") {
        Some(rest) if allow_wildcard => rest,
        Some(_) => return false,
        None => name,
    };
    if name.is_empty() || name.len() > MAX_DNS_LEN {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Conservative email check: ASCII, dot-atom local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if domain.contains('@') || local.is_empty() || local.len() > MAX_EMAIL_LOCAL_LEN {
        return false;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c))
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..");
    local_ok && domain.contains('.') && is_valid_dns_name(domain, false)
}
