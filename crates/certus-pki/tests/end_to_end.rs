use std::{io::Cursor, sync::Arc, thread};

use certus_key::{Algorithm, CancellationToken, KeyPair, MemoryKeyStore};
use certus_pki::{
    prelude::*, CaIdentity, CertificateStore, Csr, ErrorKind, KeyMaterial, KeyOrigin, MemoryStore,
    SequentialSerials,
};
use time::Duration;

fn authority() -> CertificateAuthority {
    CertificateAuthority::in_memory(CaConfig::default()).unwrap()
}

#[test]
fn issue_sign_verify_revoke_scenario() {
    let ca = authority();

    let cert = ca.issue_certificate(&CertificateRequest::new("example.com")).unwrap();
    assert_eq!(cert.not_after - cert.not_before, Duration::days(365));
    assert_eq!(cert.issuer, ca.get_ca_info().unwrap().subject);

    let document = b"0123456789";
    let record = ca
        .sign_document(document, cert.serial_number.as_str(), SigningMetadata::default())
        .unwrap();

    let result = ca.validate_signature(&record, document).unwrap();
    assert!(result.valid);
    assert!(result.reasons.is_empty());

    ca.revoke_certificate(cert.serial_number.as_str(), RevocationReason::KeyCompromise)
        .unwrap();
    let result = ca.validate_signature(&record, document).unwrap();
    assert!(!result.valid);
    assert_eq!(result.reasons, vec![FailureReason::CertificateRevoked]);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["reasons"], serde_json::json!(["CertificateRevoked"]));

    let result = ca.validate_signature(&record, b"0123456788").unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["reasons"], serde_json::json!(["DigestMismatch", "CertificateRevoked"]));
}

#[test]
fn identical_requests_get_unique_serials() {
    let ca = Arc::new(authority());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ca = Arc::clone(&ca);
            thread::spawn(move || {
                (0..5)
                    .map(|_| {
                        ca.issue_certificate(&CertificateRequest::new("same.example.com"))
                            .unwrap()
                            .serial_number
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut serials: Vec<SerialNumber> =
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let issued = serials.len();
    serials.sort();
    serials.dedup();
    assert_eq!(serials.len(), issued);
    assert_eq!(ca.list_active().unwrap().len(), issued);
}

#[test]
fn single_byte_tamper_is_digest_mismatch() {
    let ca = authority();
    let cert = ca.issue_certificate(&CertificateRequest::new("signer")).unwrap();
    let mut document = b"quarterly report".to_vec();
    let record = ca
        .sign_document(&document, cert.serial_number.as_str(), SigningMetadata::default())
        .unwrap();

    document[3] ^= 0x20;
    let result = ca.validate_signature(&record, &document).unwrap();
    assert_eq!(result.reasons, vec![FailureReason::DigestMismatch]);
    assert!(result.chain_valid);
}

#[test]
fn invalid_country_leaves_registry_unchanged() {
    let ca = authority();
    ca.issue_certificate(&CertificateRequest::new("ok.example.com")).unwrap();
    let before = ca.registry().len().unwrap();

    let mut request = CertificateRequest::new("example.com");
    request.subject.country = Some("USA".to_string());
    let err = ca.issue_certificate(&request).unwrap_err();
    assert!(matches!(err, PkiError::InvalidSubject { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ca.registry().len().unwrap(), before);
}

#[test]
fn request_parsed_from_json() {
    let ca = authority();
    let request: CertificateRequest = serde_json::from_str(
        r#"{
            "common_name": "api.example.com",
            "organization": "Example",
            "country": "SE",
            "subject_alt_names": ["api.example.com", "192.0.2.7"],
            "validity_days": 90
        }"#,
    )
    .unwrap();

    let cert = ca.issue_certificate(&request).unwrap();
    assert_eq!(cert.subject.organization.as_deref(), Some("Example"));
    assert_eq!(cert.subject_alt_names.len(), 2);
    assert_eq!(cert.not_after - cert.not_before, Duration::days(90));
}

#[test]
fn collisions_are_retried_then_reported() {
    let config = CaConfig::default();
    let registry = Arc::new(MemoryStore::new());

    let ca_with_counter = |start: u64, max: u64| {
        let identity = CaIdentity::generate(
            &config.subject,
            Algorithm::EcdsaP256Sha256,
            config.root_validity_days,
            &SequentialSerials::new(1000, 1000),
        )
        .unwrap();
        let keys = Arc::new(KeyMaterial::new(identity, Arc::new(MemoryKeyStore::new())));
        CertificateAuthority::from_parts(
            config.clone(),
            keys,
            registry.clone(),
            Arc::new(SequentialSerials::new(start, max)),
        )
    };

    let first = ca_with_counter(1, 3);
    for _ in 0..3 {
        first.issue_certificate(&CertificateRequest::new("first")).unwrap();
    }

    // serial 3 is taken, 4 is free
    let second = ca_with_counter(3, 10);
    let cert = second.issue_certificate(&CertificateRequest::new("second")).unwrap();
    assert_eq!(cert.serial_number.as_str(), "04");

    // 1 and 2 are both taken
    let third = ca_with_counter(1, 10);
    let err = third.issue_certificate(&CertificateRequest::new("third")).unwrap_err();
    assert!(matches!(err, PkiError::RegistrationConflict(_)));
    assert_eq!(registry.len().unwrap(), 4);

    let exhausted = first.issue_certificate(&CertificateRequest::new("first")).unwrap_err();
    assert!(matches!(exhausted, PkiError::AllocatorExhausted));
}

#[test]
fn csr_issuance_and_external_signature() {
    let ca = authority();
    let requester = KeyPair::generate(Algorithm::Ed25519).unwrap();
    let subject = SubjectName::new("device-17");
    let pem = Csr::create(&requester, &subject).unwrap().to_pem().unwrap();

    let cert = ca.issue_from_csr(&pem, Some(30)).unwrap();
    assert_eq!(cert.key_origin, KeyOrigin::Csr);
    assert!(ca.verify_presented_certificate(&cert.to_pem()).unwrap().valid);

    // the CA cannot sign with a key it never held
    let err = ca
        .sign_document(b"doc", cert.serial_number.as_str(), SigningMetadata::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Key);

    // a signature the requester made with its own key still verifies
    let digest = certus_key::digest(b"doc", certus_key::DigestAlgorithm::Sha256);
    let record = SignatureRecord {
        signature: requester.sign(&digest).unwrap(),
        document_digest: digest,
        digest_algorithm: certus_key::DigestAlgorithm::Sha256,
        signature_algorithm: Algorithm::Ed25519,
        signer_certificate_serial: cert.serial_number.clone(),
        reason: None,
        location: None,
        signed_at: cert.not_before,
    };
    assert!(ca.validate_signature(&record, b"doc").unwrap().valid);
}

#[test]
fn rotation_keeps_earlier_signatures_valid() {
    let ca = authority();
    let cert = ca.issue_certificate(&CertificateRequest::new("before")).unwrap();
    let record = ca
        .sign_document(b"doc", cert.serial_number.as_str(), SigningMetadata::default())
        .unwrap();

    let info = ca.rotate().unwrap();
    assert_eq!(info.retired_roots.len(), 1);
    assert!(ca.validate_signature(&record, b"doc").unwrap().valid);

    let after = ca.issue_certificate(&CertificateRequest::new("after")).unwrap();
    assert_eq!(
        after.issuer,
        ca.key_material().root_certificate().unwrap().subject
    );
    assert!(ca.verify_presented_certificate(&after.to_pem()).unwrap().valid);
}

#[test]
fn file_backed_ca_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CaConfig::default();
    config.algorithm = Algorithm::Ed25519;
    config.storage.data_dir = dir.path().to_path_buf();

    let (serial, record) = {
        let ca = CertificateAuthority::init(config.clone()).unwrap();
        let cert = ca.issue_certificate(&CertificateRequest::new("kept")).unwrap();
        let record = ca
            .sign_document(b"contract", cert.serial_number.as_str(), SigningMetadata::default())
            .unwrap();
        ca.revoke_certificate(cert.serial_number.as_str(), RevocationReason::Superseded)
            .unwrap();
        (cert.serial_number, record)
    };

    let ca = CertificateAuthority::open(config).unwrap();
    let details = ca.get_certificate_by_serial(serial.as_str()).unwrap();
    assert!(matches!(details.status, CertificateStatus::Revoked { .. }));
    assert_eq!(
        ca.validate_signature(&record, b"contract").unwrap().reasons,
        vec![FailureReason::CertificateRevoked]
    );
}

#[test]
fn streaming_sign_and_verify_with_cancellation() {
    let ca = authority();
    let cert = ca.issue_certificate(&CertificateRequest::new("stream")).unwrap();
    let document: Vec<u8> = (0..300_000u32).map(|i| (i % 256) as u8).collect();

    let record = ca
        .sign_reader(
            Cursor::new(&document),
            cert.serial_number.as_str(),
            SigningMetadata::default(),
            None,
        )
        .unwrap();
    assert!(ca
        .validate_signature_reader(&record, Cursor::new(&document), None)
        .unwrap()
        .valid);
    assert!(ca.validate_signature(&record, &document).unwrap().valid);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = ca
        .validate_signature_reader(&record, Cursor::new(&document), Some(&cancel))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn signature_record_survives_json() {
    let ca = authority();
    let cert = ca.issue_certificate(&CertificateRequest::new("json")).unwrap();
    let record = ca
        .sign_document(
            b"payload",
            cert.serial_number.as_str(),
            SigningMetadata {
                reason: Some("approved".to_string()),
                location: Some("Berlin".to_string()),
            },
        )
        .unwrap();

    let restored = SignatureRecord::from_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(restored, record);
    assert!(ca.validate_signature(&restored, b"payload").unwrap().valid);
}
