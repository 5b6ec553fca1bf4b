//! Raw X.509 v3 assembly and decoding

use std::{net::IpAddr, time::Duration as StdDuration};

use certus_key::{digest, verify_signature, Algorithm, DigestAlgorithm};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{
    asn1::{BitString, GeneralizedTime, Ia5String, OctetString, UtcTime},
    DateTime, Decode, Encode,
};
use spki::SubjectPublicKeyInfoOwned;
use time::OffsetDateTime;
use x509_cert::{
    certificate::{Certificate as X509Certificate, TbsCertificate, Version},
    ext::{
        pkix::{
            name::GeneralName, AuthorityKeyIdentifier, BasicConstraints, KeyUsage, KeyUsages,
            SubjectAltName as SanExtension, SubjectKeyIdentifier,
        },
        Extension,
    },
    serial_number::SerialNumber as X509Serial,
    time::{Time, Validity},
};

use super::{name::build_name, subject::SubjectAltName, SubjectName};
use crate::{
    error::{PkiError, Result},
    types::SerialNumber,
};

/// Bytes of the SPKI SHA-256 kept as key identifier
const KEY_ID_LEN: usize = 20;

/// Inputs for a to-be-signed certificate
pub(crate) struct TbsTemplate<'a> {
    pub serial: &'a SerialNumber,
    pub issuer: &'a SubjectName,
    pub subject: &'a SubjectName,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub subject_public_key: &'a [u8],
    pub algorithm: Algorithm,
    pub extensions: Vec<Extension>,
}

pub(crate) fn build_tbs(template: TbsTemplate<'_>) -> Result<TbsCertificate> {
    let serial_number: X509Serial = X509Serial::new(&template.serial.to_bytes())?;
    let subject_public_key_info = SubjectPublicKeyInfoOwned::from_der(template.subject_public_key)
        .map_err(|e| PkiError::InvalidRequest(format!("invalid subject public key: {e}")))?;

    Ok(TbsCertificate {
        version: Version::V3,
        serial_number,
        signature: template.algorithm.signature_algorithm_id(),
        issuer: build_name(template.issuer)?,
        validity: Validity {
            not_before: to_x509_time(template.not_before)?,
            not_after: to_x509_time(template.not_after)?,
        },
        subject: build_name(template.subject)?,
        subject_public_key_info,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(template.extensions),
    })
}

/// Wrap a TBS structure and its signature into a DER certificate
pub(crate) fn assemble(
    tbs: TbsCertificate,
    algorithm: Algorithm,
    signature: &[u8],
) -> Result<Vec<u8>> {
    let certificate = X509Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm.signature_algorithm_id(),
        signature: BitString::from_bytes(signature)?,
    };
    Ok(certificate.to_der()?)
}

fn extension<T: AssociatedOid + Encode>(value: &T, critical: bool) -> Result<Extension> {
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

/// Extensions of a self-signed CA root
pub(crate) fn ca_extensions(key_id: &[u8]) -> Result<Vec<Extension>> {
    Ok(vec![
        extension(
            &BasicConstraints {
                ca: true,
                path_len_constraint: Some(0),
            },
            true,
        )?,
        extension(&KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign), true)?,
        extension(&SubjectKeyIdentifier(OctetString::new(key_id)?), false)?,
    ])
}

/// Extensions of an end-entity certificate
pub(crate) fn leaf_extensions(
    subject_key_id: &[u8],
    authority_key_id: &[u8],
    alt_names: &[SubjectAltName],
) -> Result<Vec<Extension>> {
    let mut extensions = vec![
        extension(
            &BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
            true,
        )?,
        extension(
            &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::NonRepudiation),
            true,
        )?,
        extension(&SubjectKeyIdentifier(OctetString::new(subject_key_id)?), false)?,
        extension(
            &AuthorityKeyIdentifier {
                key_identifier: Some(OctetString::new(authority_key_id)?),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            },
            false,
        )?,
    ];

    if !alt_names.is_empty() {
        let names = alt_names
            .iter()
            .map(general_name)
            .collect::<Result<Vec<_>>>()?;
        extensions.push(extension(&SanExtension(names), false)?);
    }

    Ok(extensions)
}

fn general_name(san: &SubjectAltName) -> Result<GeneralName> {
    Ok(match san {
        SubjectAltName::Dns(name) => GeneralName::DnsName(Ia5String::new(name)?),
        SubjectAltName::Email(email) => GeneralName::Rfc822Name(Ia5String::new(email)?),
        SubjectAltName::Ip(IpAddr::V4(ip)) => {
            GeneralName::IpAddress(OctetString::new(ip.octets().to_vec())?)
        }
        SubjectAltName::Ip(IpAddr::V6(ip)) => {
            GeneralName::IpAddress(OctetString::new(ip.octets().to_vec())?)
        }
    })
}

/// subjectAltName entries of a decoded certificate; unsupported kinds are skipped
pub(crate) fn subject_alt_names(tbs: &TbsCertificate) -> Result<Vec<SubjectAltName>> {
    let mut alt_names = Vec::new();
    let Some(extensions) = &tbs.extensions else {
        return Ok(alt_names);
    };

    for ext in extensions.iter().filter(|ext| ext.extn_id == SanExtension::OID) {
        let san = SanExtension::from_der(ext.extn_value.as_bytes())?;
        for name in san.0 {
            match name {
                GeneralName::DnsName(dns) => alt_names.push(SubjectAltName::Dns(dns.to_string())),
                GeneralName::Rfc822Name(email) => {
                    alt_names.push(SubjectAltName::Email(email.to_string()))
                }
                GeneralName::IpAddress(octets) => {
                    let bytes = octets.as_bytes();
                    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
                        alt_names.push(SubjectAltName::Ip(IpAddr::from(v4)));
                    } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
                        alt_names.push(SubjectAltName::Ip(IpAddr::from(v6)));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(alt_names)
}

/// Key identifier derived from an SPKI: leftmost 160 bits of its SHA-256
pub fn key_identifier(spki_der: &[u8]) -> Vec<u8> {
    let mut id = digest(spki_der, DigestAlgorithm::Sha256);
    id.truncate(KEY_ID_LEN);
    id
}

/// UTCTime through 2049, GeneralizedTime afterwards (RFC 5280 §4.1.2.5)
pub(crate) fn to_x509_time(t: OffsetDateTime) -> Result<Time> {
    let secs = u64::try_from(t.unix_timestamp())
        .map_err(|_| PkiError::Encoding(format!("{t} predates the unix epoch")))?;
    let date_time = DateTime::from_unix_duration(StdDuration::from_secs(secs))?;
    if date_time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(date_time)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

pub(crate) fn from_x509_time(t: &Time) -> Result<OffsetDateTime> {
    let secs = i64::try_from(t.to_unix_duration().as_secs())
        .map_err(|_| PkiError::Encoding("certificate time out of range".to_string()))?;
    Ok(OffsetDateTime::from_unix_timestamp(secs)?)
}

/// The parts of a DER certificate needed to check who signed it.
///
/// Decoding does not require the algorithms to be ones this CA uses, so a
/// foreign certificate can still be examined and reported on.
#[derive(Debug, Clone)]
pub struct SignedParts {
    pub serial: SerialNumber,
    pub issuer_der: Vec<u8>,
    pub subject_der: Vec<u8>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub tbs_der: Vec<u8>,
    pub signature_oid: ObjectIdentifier,
    pub signature: Vec<u8>,
}

impl SignedParts {
    pub fn decode(der: &[u8]) -> Result<Self> {
        let certificate = X509Certificate::from_der(der)
            .map_err(|e| PkiError::InvalidRequest(format!("not a DER certificate: {e}")))?;
        let tbs = &certificate.tbs_certificate;

        Ok(Self {
            serial: SerialNumber::from_bytes(tbs.serial_number.as_bytes())?,
            issuer_der: tbs.issuer.to_der()?,
            subject_der: tbs.subject.to_der()?,
            not_before: from_x509_time(&tbs.validity.not_before)?,
            not_after: from_x509_time(&tbs.validity.not_after)?,
            tbs_der: tbs.to_der()?,
            signature_oid: certificate.signature_algorithm.oid,
            signature: certificate.signature.raw_bytes().to_vec(),
        })
    }

    /// Whether `issuer` (a DER certificate) signed these parts.
    ///
    /// A name mismatch or a signature algorithm other than the issuer's key
    /// algorithm is simply `false`.
    pub fn is_signed_by(
        &self,
        issuer_der: &[u8],
        issuer_spki: &[u8],
        issuer_algorithm: Algorithm,
    ) -> Result<bool> {
        let issuer = SignedParts::decode(issuer_der)?;
        if issuer.subject_der != self.issuer_der {
            return Ok(false);
        }
        match Algorithm::from_signature_oid(&self.signature_oid) {
            Ok(algorithm) if algorithm == issuer_algorithm => {}
            _ => return Ok(false),
        }
        Ok(verify_signature(issuer_spki, &self.tbs_der, &self.signature)?)
    }
}
