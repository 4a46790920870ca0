//! Canonical document signing
//!
//! A [`Signer`] produces two independent RSA PKCS#1 v1.5 signatures over the
//! exact payload bytes: a legacy SHA-1 pair (base64 encoded) and a SHA-512
//! pair (hex encoded). Both are verified against the public key of the first
//! certificate of the chain before they are handed out.
//!
//! Unsigned output is a supported mode: a signer configured with neither key
//! nor certificates returns no signature. Configuring only one of them is an
//! error.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{DigestSigner, DigestVerifier, SignatureEncoding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use x509_cert::der::Encode;
use x509_cert::Certificate;

mod chain;
mod error;

pub use chain::{load_certificates, parse_certificates, public_key, validate_chain};
pub use error::SigningError;

/// Key material locations for catalog signing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    /// PEM private key (PKCS#8 or PKCS#1)
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Certificate chain, signing certificate first
    #[serde(default)]
    pub certificates: Vec<PathBuf>,

    /// Trust anchors the chain is validated against
    #[serde(default)]
    pub root_certificates: Vec<PathBuf>,
}

impl SigningConfig {
    pub fn is_empty(&self) -> bool {
        self.private_key.is_none() && self.certificates.is_empty()
    }
}

/// Load an RSA private key from PEM, PKCS#8 first then PKCS#1
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, SigningError> {
    let pem = std::fs::read_to_string(path).map_err(|source| SigningError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_private_key(&pem)
}

pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, SigningError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8| {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|pkcs1| SigningError::InvalidKey(format!("{pkcs8}; {pkcs1}")))
        })
}

/// The result of signing one payload
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub payload: Vec<u8>,
    pub digest_sha1: Vec<u8>,
    pub signature_sha1: Vec<u8>,
    pub digest_sha512: Vec<u8>,
    pub signature_sha512: Vec<u8>,
    /// DER encoded, signing certificate first
    pub certificate_chain: Vec<Vec<u8>>,
    pub generated_at: DateTime<Utc>,
}

impl SignedDocument {
    /// The published `signature` object
    pub fn signature_block(&self) -> SignatureBlock {
        let b64 = base64::engine::general_purpose::STANDARD;
        SignatureBlock {
            certificates: self.certificate_chain.iter().map(|der| b64.encode(der)).collect(),
            correct_digest: b64.encode(&self.digest_sha1),
            correct_signature: b64.encode(&self.signature_sha1),
            correct_digest512: hex::encode(&self.digest_sha512),
            correct_signature512: hex::encode(&self.signature_sha512),
        }
    }
}

/// Signature object as embedded in published documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Base64 DER certificates, signing certificate first
    pub certificates: Vec<String>,
    /// Base64 SHA-1 digest of the payload
    pub correct_digest: String,
    /// Base64 SHA-1 with RSA signature
    pub correct_signature: String,
    /// Hex SHA-512 digest of the payload
    pub correct_digest512: String,
    /// Hex SHA-512 with RSA signature
    pub correct_signature512: String,
}

impl SignatureBlock {
    /// Check both digests and signatures against `payload` and the first certificate
    pub fn verify(&self, payload: &[u8]) -> Result<(), SigningError> {
        let malformed = |what: &str| SigningError::MalformedSignature(what.to_string());
        let b64 = base64::engine::general_purpose::STANDARD;

        let leaf = self
            .certificates
            .first()
            .ok_or_else(|| malformed("no certificates"))?;
        let der = b64.decode(leaf).map_err(|_| malformed("certificate is not base64"))?;
        let certificate = parse_certificates(&der, "signature block")?
            .into_iter()
            .next()
            .ok_or_else(|| malformed("no certificates"))?;
        let key = public_key(&certificate)?;

        let digests = DualDigest::of(payload);
        if b64.encode(digests.sha1.clone().finalize()) != self.correct_digest
            || hex::encode(digests.sha512.clone().finalize()) != self.correct_digest512
        {
            return Err(malformed("digest does not match payload"));
        }

        let sha1_signature = b64
            .decode(&self.correct_signature)
            .map_err(|_| malformed("correct_signature is not base64"))?;
        let sha512_signature = hex::decode(&self.correct_signature512)
            .map_err(|_| malformed("correct_signature512 is not hex"))?;
        digests.verify(&key, &sha1_signature, &sha512_signature)
    }
}

/// SHA-1 and SHA-512 state fed from a single byte stream
#[derive(Clone, Default)]
struct DualDigest {
    sha1: Sha1,
    sha512: Sha512,
}

impl DualDigest {
    fn of(payload: &[u8]) -> Self {
        let mut digest = Self::default();
        digest.sha1.update(payload);
        digest.sha512.update(payload);
        digest
    }

    fn sign(&self, key: &RsaPrivateKey) -> Result<(Signature, Signature), SigningError> {
        let sha1 = SigningKey::<Sha1>::new(key.clone())
            .try_sign_digest(self.sha1.clone())
            .map_err(|source| SigningError::Sign {
                algorithm: "SHA-1",
                source,
            })?;
        let sha512 = SigningKey::<Sha512>::new(key.clone())
            .try_sign_digest(self.sha512.clone())
            .map_err(|source| SigningError::Sign {
                algorithm: "SHA-512",
                source,
            })?;
        Ok((sha1, sha512))
    }

    fn verify(
        &self,
        key: &RsaPublicKey,
        sha1_signature: &[u8],
        sha512_signature: &[u8],
    ) -> Result<(), SigningError> {
        let sha1_ok = Signature::try_from(sha1_signature).is_ok_and(|signature| {
            VerifyingKey::<Sha1>::new(key.clone())
                .verify_digest(self.sha1.clone(), &signature)
                .is_ok()
        });
        if !sha1_ok {
            return Err(SigningError::SelfVerificationFailed { algorithm: "SHA-1" });
        }

        let sha512_ok = Signature::try_from(sha512_signature).is_ok_and(|signature| {
            VerifyingKey::<Sha512>::new(key.clone())
                .verify_digest(self.sha512.clone(), &signature)
                .is_ok()
        });
        if !sha512_ok {
            return Err(SigningError::SelfVerificationFailed {
                algorithm: "SHA-512",
            });
        }
        Ok(())
    }
}

impl Write for DualDigest {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sha1.update(buf);
        self.sha512.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Credentials {
    key: RsaPrivateKey,
    chain: Vec<Certificate>,
}

/// Signs exactly one document
///
/// `sign` consumes the signer, so a configured signer cannot be reused.
pub struct Signer {
    credentials: Option<Credentials>,
    anchors: Vec<Certificate>,
}

impl Signer {
    /// A signer that produces no signature
    pub fn unsigned() -> Self {
        Self {
            credentials: None,
            anchors: Vec::new(),
        }
    }

    pub fn new(
        key: Option<RsaPrivateKey>,
        chain: Vec<Certificate>,
        anchors: Vec<Certificate>,
    ) -> Result<Self, SigningError> {
        let credentials = match (key, chain.is_empty()) {
            (None, true) => None,
            (Some(key), false) => Some(Credentials { key, chain }),
            (Some(_), true) => {
                return Err(SigningError::PartialConfiguration(
                    "a private key is configured but no certificate",
                ))
            }
            (None, false) => {
                return Err(SigningError::PartialConfiguration(
                    "certificates are configured but no private key",
                ))
            }
        };
        Ok(Self {
            credentials,
            anchors,
        })
    }

    /// Load key material from the configured files
    pub fn from_config(config: &SigningConfig) -> Result<Self, SigningError> {
        let key = config
            .private_key
            .as_deref()
            .map(load_private_key)
            .transpose()?;

        let mut chain = Vec::new();
        for path in &config.certificates {
            chain.extend(load_certificates(path)?);
        }
        let mut anchors = Vec::new();
        for path in &config.root_certificates {
            anchors.extend(load_certificates(path)?);
        }

        debug!(
            certificates = chain.len(),
            anchors = anchors.len(),
            "Loaded signing material"
        );
        Self::new(key, chain, anchors)
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Sign `payload`; `Ok(None)` when signing is not configured
    pub fn sign(self, payload: &[u8]) -> Result<Option<SignedDocument>, SigningError> {
        self.sign_reader(payload)
    }

    /// Sign everything read from `reader`
    pub fn sign_reader(self, mut reader: impl Read) -> Result<Option<SignedDocument>, SigningError> {
        let Some(Credentials { key, chain }) = self.credentials else {
            info!("Signing is not configured; publishing unsigned");
            return Ok(None);
        };

        if let Err(e) = validate_chain(&chain, &self.anchors, SystemTime::now()) {
            warn!("{}; signing anyway", e);
        }

        let mut payload = Vec::new();
        let mut digests = DualDigest::default();
        {
            let mut tee = TeeReader {
                inner: &mut reader,
                sink: &mut digests,
            };
            tee.read_to_end(&mut payload)
                .map_err(|source| SigningError::Read {
                    path: PathBuf::from("<payload>"),
                    source,
                })?;
        }

        let (sha1_signature, sha512_signature) = digests.sign(&key)?;
        let sha1_signature = sha1_signature.to_vec();
        let sha512_signature = sha512_signature.to_vec();

        let leaf_key = public_key(&chain[0])?;
        digests.verify(&leaf_key, &sha1_signature, &sha512_signature)?;

        let certificate_chain = chain
            .iter()
            .map(|certificate| certificate.to_der())
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            bytes = payload.len(),
            certificates = certificate_chain.len(),
            "Signed document"
        );

        Ok(Some(SignedDocument {
            digest_sha1: digests.sha1.finalize().to_vec(),
            digest_sha512: digests.sha512.finalize().to_vec(),
            payload,
            signature_sha1: sha1_signature,
            signature_sha512: sha512_signature,
            certificate_chain,
            generated_at: Utc::now(),
        }))
    }
}

/// Copies everything read through it into `sink`
struct TeeReader<'a, R, W> {
    inner: &'a mut R,
    sink: &'a mut W,
}

impl<R: Read, W: Write> Read for TeeReader<'_, R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests;
