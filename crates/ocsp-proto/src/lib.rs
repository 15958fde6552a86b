//! OCSP Client Implementation
//!
//! This crate provides an Online Certificate Status Protocol client as
//! defined in RFC 6960.
//!
//! # Features
//!
//! - Certificate loading from PEM, DER or bare base64
//! - CertID derivation with SHA-1, SHA-256, SHA-384 or SHA-512
//! - Nonce extension for replay protection
//! - HTTP POST, and GET for small requests
//! - Response signature verification (issuer, delegated or trusted responder)
//! - Freshness, nonce and CertID checks
//! - Optional result cache keyed by CertID
//!
//! Revoked and unknown certificates are statuses on a successful
//! [`CheckResult`]. Failures of the exchange itself are [`OcspError`]s.
//!
//! # Example
//!
//! ```no_run
//! use ocsp_proto::{CertStatus, CheckOptions, OcspClient, OcspConfig};
//!
//! # async fn example(cert: &[u8], issuer: &[u8]) -> Result<(), ocsp_proto::OcspError> {
//! let client = OcspClient::new(OcspConfig::default())?;
//! let result = client
//!     .check_status(cert, issuer, "http://ocsp.example.com", &CheckOptions::default())
//!     .await?;
//!
//! match result.status() {
//!     CertStatus::Good => println!("good"),
//!     CertStatus::Revoked { reason, .. } => println!("revoked: {:?}", reason),
//!     CertStatus::Unknown => println!("unknown"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cert;
pub mod client;
pub mod config;
pub mod der;
pub mod error;
pub mod request;
pub mod resolve;
pub mod response;
pub mod transport;
pub mod validate;

pub use cache::OcspCache;
pub use cert::{load, load_file, Certificate, CertificateFormat};
pub use client::{extract_ocsp_url, CheckOptions, OcspClient};
pub use config::{OcspConfig, TrustModel};
pub use error::{ErrorKind, OcspError};
pub use request::{build, CertId, HashAlgorithm, OcspRequest, OcspRequestBuilder, RequestOptions};
pub use resolve::{resolve, CheckResult};
pub use response::{
    CertStatus, OcspResponse, OcspResponseStatus, ResponderId, RevocationReason, SingleResponse,
};
pub use transport::HttpTransport;
pub use validate::{validate, Signer, TrustAnchors, ValidatedResponse, ValidationContext};
