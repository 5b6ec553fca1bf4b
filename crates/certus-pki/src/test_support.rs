//! Fixtures shared by unit tests

use certus_key::{Algorithm, KeyPair};
use der::Encode;
use time::{Duration, OffsetDateTime};

use crate::{
    cert::{x509, Certificate, SubjectName},
    types::{now_seconds, KeyOrigin, SerialNumber},
};

/// A self-signed certificate with the given serial and validity window
pub(crate) fn certificate_with_window(
    serial: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> Certificate {
    let key = KeyPair::generate(Algorithm::Ed25519).unwrap();
    let spki = key.public_key_der().unwrap();
    let serial = SerialNumber::parse(serial).unwrap();
    let subject = SubjectName::new(format!("fixture-{serial}"));
    let tbs = x509::build_tbs(x509::TbsTemplate {
        serial: &serial,
        issuer: &subject,
        subject: &subject,
        not_before,
        not_after,
        subject_public_key: &spki,
        algorithm: Algorithm::Ed25519,
        extensions: x509::leaf_extensions(&[1; 20], &[1; 20], &[]).unwrap(),
    })
    .unwrap();
    let signature = key.sign(&tbs.to_der().unwrap()).unwrap();
    let der = x509::assemble(tbs, Algorithm::Ed25519, &signature).unwrap();
    Certificate::from_der(&der, KeyOrigin::Generated).unwrap()
}

/// A certificate valid from now for `days`
pub(crate) fn certificate(serial: &str, days: i64) -> Certificate {
    let now = now_seconds();
    certificate_with_window(serial, now, now + Duration::days(days))
}
