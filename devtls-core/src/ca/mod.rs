//! Local Certificate Authority for development
//!
//! Creates and loads the machine-local root CA and issues leaf certificates
//! for project hostnames.
//!
//! Storage model:
//! - `rootCA.pem` is world-readable so it can be handed to trust stores
//! - `rootCA-key.pem` is owner read-only and is written before the certificate
//! - A CA directory holding only the certificate is "certificate-only": it can
//!   be trusted or untrusted, but it cannot sign new leaf certificates

mod authority;
mod keys;
mod leaf;

use std::path::PathBuf;
use thiserror::Error;

pub use authority::{
    CertificateAuthority, LocalCaStore, ROOT_CERT_FILENAME, ROOT_KEY_FILENAME, TrustEntry,
};
pub(crate) use authority::write_file;
pub use keys::{KeyStrength, RsaKey, SerialNumberSource};
pub use leaf::{
    CertFileLayout, HostName, IssuedCertificate, LEAF_CERT_FILENAME, LEAF_COMBINED_FILENAME,
    LEAF_KEY_FILENAME, LeafCertificate, LeafIssuer, classify_host,
};

/// Errors that can occur during CA operations
#[derive(Debug, Error)]
pub enum CaError {
    #[error("Failed to generate keypair: {0}")]
    KeypairGeneration(String),

    #[error("Failed to generate certificate: {0}")]
    CertificateGeneration(String),

    #[error("Failed to parse certificate/key: {0}")]
    Parse(String),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error(
        "The local CA has no private key, so it cannot sign certificates. Reinstall the CA with `devtls ca install --force`."
    )]
    NoSigningKey,

    #[error(
        "Refusing to create a new CA because a CA key already exists at {0}. Remove it or restore the matching rootCA.pem."
    )]
    KeyWithoutCertificate(PathBuf),

    #[error("Failed to serialize routing snippet: {0}")]
    YamlSerialize(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CaError>;
