use super::*;
use pretty_assertions::assert_eq;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::EncodePem;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

fn generate_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

fn key_a() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

fn key_b() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

fn issue(
    profile: Profile,
    subject: &str,
    subject_key: &RsaPrivateKey,
    issuer_key: &RsaPrivateKey,
) -> Certificate {
    let signer = SigningKey::<sha2::Sha256>::new(issuer_key.clone());
    let spki = SubjectPublicKeyInfoOwned::from_key(subject_key.to_public_key()).unwrap();
    CertificateBuilder::new(
        profile,
        SerialNumber::new(&[0x01]).unwrap(),
        Validity::from_now(Duration::from_secs(3600)).unwrap(),
        Name::from_str(subject).unwrap(),
        spki,
        &signer,
    )
    .unwrap()
    .build::<Signature>()
    .unwrap()
}

fn self_signed(key: &RsaPrivateKey) -> Certificate {
    issue(Profile::Root, "CN=Update Site Test,O=Example", key, key)
}

fn sha1_base64(payload: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha1::digest(payload))
}

#[test]
fn test_unconfigured_signer_returns_nothing() {
    assert!(Signer::unsigned().sign(b"{}").unwrap().is_none());

    let signer = Signer::new(None, Vec::new(), Vec::new()).unwrap();
    assert!(!signer.is_configured());
    assert!(signer.sign(b"{}").unwrap().is_none());
}

#[test]
fn test_partial_configuration_is_fatal() {
    let err = Signer::new(Some(key_a().clone()), Vec::new(), Vec::new())
        .err()
        .unwrap();
    assert!(matches!(err, SigningError::PartialConfiguration(_)));

    let err = Signer::new(None, vec![self_signed(key_a())], Vec::new())
        .err()
        .unwrap();
    assert!(matches!(err, SigningError::PartialConfiguration(_)));
}

#[test]
fn test_signature_verifies_over_exact_payload() {
    let certificate = self_signed(key_a());
    let payload = br#"{"core":{"name":"core"},"plugins":{}}"#;

    let signer = Signer::new(
        Some(key_a().clone()),
        vec![certificate.clone()],
        vec![certificate],
    )
    .unwrap();
    let document = signer.sign(payload).unwrap().unwrap();

    assert_eq!(document.payload, payload.to_vec());
    assert_eq!(document.certificate_chain.len(), 1);

    let block = document.signature_block();
    assert_eq!(block.correct_digest, sha1_base64(payload));
    assert_eq!(
        block.correct_digest512,
        hex::encode(Sha512::digest(payload))
    );
    assert!(hex::decode(&block.correct_signature512).is_ok());

    block.verify(payload).unwrap();
    assert!(block.verify(b"{\"plugins\":{}}").is_err());
}

#[test]
fn test_signing_twice_still_verifies() {
    let certificate = self_signed(key_a());
    let payload = b"the same bytes";

    for _ in 0..2 {
        let signer = Signer::new(Some(key_a().clone()), vec![certificate.clone()], Vec::new())
            .unwrap();
        let block = signer.sign(payload).unwrap().unwrap().signature_block();
        block.verify(payload).unwrap();
    }
}

#[test]
fn test_key_certificate_mismatch_fails_self_verification() {
    let certificate = self_signed(key_a());
    let signer = Signer::new(Some(key_b().clone()), vec![certificate], Vec::new()).unwrap();

    let err = signer.sign(b"payload").unwrap_err();
    assert!(matches!(
        err,
        SigningError::SelfVerificationFailed { algorithm: "SHA-1" }
    ));
}

#[test]
fn test_tampered_signature_block_is_rejected() {
    let certificate = self_signed(key_a());
    let signer = Signer::new(Some(key_a().clone()), vec![certificate], Vec::new()).unwrap();
    let mut block = signer.sign(b"payload").unwrap().unwrap().signature_block();

    block.correct_signature512 = block.correct_signature512.replace('a', "b");
    let err = block.verify(b"payload").unwrap_err();
    assert!(matches!(
        err,
        SigningError::SelfVerificationFailed {
            algorithm: "SHA-512"
        }
    ));
}

#[test]
fn test_chain_validation() {
    let root = self_signed(key_a());
    let leaf = issue(
        Profile::Leaf {
            issuer: root.tbs_certificate.subject.clone(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        "CN=Update Site Signer,O=Example",
        key_b(),
        key_a(),
    );
    let now = SystemTime::now();

    validate_chain(&[root.clone()], &[root.clone()], now).unwrap();
    validate_chain(&[leaf.clone()], &[root.clone()], now).unwrap();
    validate_chain(&[leaf.clone(), root.clone()], &[root.clone()], now).unwrap();

    assert!(validate_chain(&[leaf.clone()], &[], now).is_err());
    assert!(validate_chain(&[leaf.clone()], &[leaf.clone()], now).is_ok());
    assert!(validate_chain(&[root.clone(), leaf.clone()], &[root.clone()], now).is_err());
    assert!(validate_chain(&[], &[root.clone()], now).is_err());

    let other_root = self_signed(key_b());
    assert!(validate_chain(&[leaf.clone()], &[other_root], now).is_err());

    let later = now + Duration::from_secs(10 * 365 * 24 * 3600);
    let err = validate_chain(&[leaf], &[root], later).unwrap_err();
    assert!(err.to_string().contains("expired"));
}

#[test]
fn test_untrusted_chain_still_signs() {
    let certificate = self_signed(key_a());
    let signer = Signer::new(Some(key_a().clone()), vec![certificate], Vec::new()).unwrap();
    assert!(signer.sign(b"payload").unwrap().is_some());
}

#[test]
fn test_private_key_formats() {
    let pkcs8 = key_a().to_pkcs8_pem(LineEnding::LF).unwrap();
    let pkcs1 = key_a().to_pkcs1_pem(LineEnding::LF).unwrap();

    assert_eq!(&parse_private_key(&pkcs8).unwrap(), key_a());
    assert_eq!(&parse_private_key(&pkcs1).unwrap(), key_a());
    assert!(matches!(
        parse_private_key("not a key"),
        Err(SigningError::InvalidKey(_))
    ));
}

#[test]
fn test_certificate_formats() {
    let certificate = self_signed(key_a());
    let der = certificate.to_der().unwrap();
    let pem = certificate.to_pem(LineEnding::LF).unwrap();

    assert_eq!(parse_certificates(&der, "der").unwrap(), vec![certificate.clone()]);
    assert_eq!(
        parse_certificates(format!("{pem}{pem}").as_bytes(), "pem").unwrap(),
        vec![certificate.clone(), certificate]
    );
    assert!(parse_certificates(b"garbage", "garbage").is_err());
}

#[test]
fn test_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let key_path = temp_dir.path().join("update-site.key");
    let cert_path = temp_dir.path().join("update-site.crt");

    let certificate = self_signed(key_a());
    std::fs::write(&key_path, key_a().to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(&cert_path, certificate.to_pem(LineEnding::LF).unwrap()).unwrap();

    let config = SigningConfig {
        private_key: Some(key_path.clone()),
        certificates: vec![cert_path.clone()],
        root_certificates: vec![cert_path],
    };
    let signer = Signer::from_config(&config).unwrap();
    assert!(signer.is_configured());
    let block = signer.sign(b"payload").unwrap().unwrap().signature_block();
    block.verify(b"payload").unwrap();

    let partial = SigningConfig {
        private_key: Some(key_path),
        ..Default::default()
    };
    assert!(matches!(
        Signer::from_config(&partial),
        Err(SigningError::PartialConfiguration(_))
    ));

    let missing = SigningConfig {
        private_key: Some(temp_dir.path().join("missing.key")),
        ..Default::default()
    };
    assert!(matches!(
        Signer::from_config(&missing),
        Err(SigningError::Read { .. })
    ));
}

#[test]
fn test_signature_block_field_names() {
    let block = SignatureBlock {
        certificates: vec!["AAAA".to_string()],
        correct_digest: "d".to_string(),
        correct_signature: "s".to_string(),
        correct_digest512: "d5".to_string(),
        correct_signature512: "s5".to_string(),
    };
    let json = serde_json::to_value(&block).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "certificates": ["AAAA"],
            "correct_digest": "d",
            "correct_signature": "s",
            "correct_digest512": "d5",
            "correct_signature512": "s5",
        })
    );
}
