//! devtls core - local development TLS
//!
//! This crate owns the machine-local root CA, issues per-project leaf
//! certificates signed by it, and adds or removes the CA in NSS browser trust
//! stores (Firefox profiles, the shared Chromium database, the system database).
//!
//! The `devtls` binary is a thin CLI over these types.

pub mod ca;
pub mod paths;
pub mod router;
pub mod truststore;

pub use ca::{CaError, CertificateAuthority, LeafIssuer, LocalCaStore};
pub use router::{CertConsumer, RoutingSnippet};
pub use truststore::{TrustStoreError, TrustStoreManager};
