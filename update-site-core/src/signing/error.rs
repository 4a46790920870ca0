//! Signing error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring a signer or producing a signature
#[derive(Error, Debug)]
pub enum SigningError {
    /// Only one of private key / certificate chain was configured
    #[error("Incomplete signing configuration: {0}\n\nConfigure both a private key and at least one certificate, or neither to publish unsigned.")]
    PartialConfiguration(&'static str),

    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid certificate {origin}: {reason}")]
    InvalidCertificate { origin: String, reason: String },

    /// The certificate chain does not lead to a trust anchor
    #[error("Untrusted certificate chain: {0}")]
    UntrustedChain(String),

    #[error("Failed to compute {algorithm} signature")]
    Sign {
        algorithm: &'static str,
        #[source]
        source: rsa::signature::Error,
    },

    /// A freshly produced signature does not verify against the certificate key
    #[error("SECURITY: {algorithm} signature failed self-verification against the signing certificate; refusing to publish")]
    SelfVerificationFailed { algorithm: &'static str },

    #[error("Malformed signature block: {0}")]
    MalformedSignature(String),

    #[error("Failed to encode certificate")]
    Encoding(#[from] x509_cert::der::Error),
}
