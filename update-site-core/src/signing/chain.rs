//! Certificate loading and chain validation

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use std::path::Path;
use std::time::SystemTime;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use super::SigningError;

const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// Load every certificate from a PEM bundle or a single DER file
pub fn load_certificates(path: &Path) -> Result<Vec<Certificate>, SigningError> {
    let bytes = std::fs::read(path).map_err(|source| SigningError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_certificates(&bytes, &path.display().to_string())
}

pub fn parse_certificates(bytes: &[u8], origin: &str) -> Result<Vec<Certificate>, SigningError> {
    let invalid = |reason: String| SigningError::InvalidCertificate {
        origin: origin.to_string(),
        reason,
    };

    let is_pem = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|start| bytes[start..].starts_with(b"-----BEGIN"));

    let certificates = if is_pem {
        Certificate::load_pem_chain(bytes).map_err(|e| invalid(e.to_string()))?
    } else {
        vec![Certificate::from_der(bytes).map_err(|e| invalid(e.to_string()))?]
    };

    if certificates.is_empty() {
        return Err(invalid("no certificates found".to_string()));
    }
    Ok(certificates)
}

pub(crate) fn subject(certificate: &Certificate) -> String {
    certificate.tbs_certificate.subject.to_string()
}

/// RSA public key of a certificate's subject
pub fn public_key(certificate: &Certificate) -> Result<RsaPublicKey, SigningError> {
    let spki = certificate.tbs_certificate.subject_public_key_info.to_der()?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| SigningError::InvalidCertificate {
        origin: subject(certificate),
        reason: format!("not an RSA public key: {e}"),
    })
}

fn verify_with<D>(key: RsaPublicKey, message: &[u8], signature: &Signature) -> bool
where
    D: sha2::Digest + rsa::pkcs8::AssociatedOid,
{
    VerifyingKey::<D>::new(key).verify(message, signature).is_ok()
}

/// Check that `issuer` issued and signed `certificate`
fn verify_issued_by(certificate: &Certificate, issuer: &Certificate) -> Result<(), String> {
    if certificate.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(format!(
            "'{}' is not issued by '{}'",
            subject(certificate),
            subject(issuer)
        ));
    }

    let key = public_key(issuer).map_err(|e| e.to_string())?;
    let tbs = certificate
        .tbs_certificate
        .to_der()
        .map_err(|e| e.to_string())?;
    let signature = Signature::try_from(certificate.signature.raw_bytes())
        .map_err(|e| format!("malformed signature on '{}': {e}", subject(certificate)))?;

    let oid = certificate.signature_algorithm.oid;
    let valid = if oid == SHA1_WITH_RSA {
        verify_with::<Sha1>(key, &tbs, &signature)
    } else if oid == SHA256_WITH_RSA {
        verify_with::<Sha256>(key, &tbs, &signature)
    } else if oid == SHA384_WITH_RSA {
        verify_with::<Sha384>(key, &tbs, &signature)
    } else if oid == SHA512_WITH_RSA {
        verify_with::<Sha512>(key, &tbs, &signature)
    } else {
        return Err(format!(
            "unsupported signature algorithm {oid} on '{}'",
            subject(certificate)
        ));
    };

    if valid {
        Ok(())
    } else {
        Err(format!(
            "signature on '{}' does not verify against '{}'",
            subject(certificate),
            subject(issuer)
        ))
    }
}

fn check_validity(certificate: &Certificate, now: SystemTime) -> Result<(), String> {
    let validity = &certificate.tbs_certificate.validity;
    if now < validity.not_before.to_system_time() {
        return Err(format!("'{}' is not yet valid", subject(certificate)));
    }
    if now > validity.not_after.to_system_time() {
        return Err(format!("'{}' has expired", subject(certificate)));
    }
    Ok(())
}

/// Validate `chain` (leaf first) against `anchors` at time `now`
///
/// Every certificate must be within its validity window and issued by the
/// next one; the last must be an anchor or be issued by one.
pub fn validate_chain(
    chain: &[Certificate],
    anchors: &[Certificate],
    now: SystemTime,
) -> Result<(), SigningError> {
    let untrusted = SigningError::UntrustedChain;

    let Some(last) = chain.last() else {
        return Err(untrusted("empty certificate chain".to_string()));
    };

    for certificate in chain {
        check_validity(certificate, now).map_err(untrusted)?;
    }
    for pair in chain.windows(2) {
        verify_issued_by(&pair[0], &pair[1]).map_err(untrusted)?;
    }

    if anchors.is_empty() {
        return Err(untrusted("no trust anchors configured".to_string()));
    }
    if anchors.iter().any(|anchor| anchor == last) {
        return Ok(());
    }
    if anchors
        .iter()
        .any(|anchor| verify_issued_by(last, anchor).is_ok())
    {
        return Ok(());
    }

    Err(untrusted(format!(
        "'{}' is not issued by any trust anchor",
        subject(last)
    )))
}
