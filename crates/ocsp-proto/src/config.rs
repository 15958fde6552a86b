//! Configuration types for OCSP status checking
//!
//! This module defines the client configuration and the trust model used
//! to decide which keys may sign an OCSP response.

use crate::cert::{self, Certificate, CertificateFormat};
use crate::error::OcspError;
use crate::request::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest nonce the client will generate
pub const MAX_NONCE_LEN: usize = 128;

/// Largest accepted clock skew tolerance (one day)
pub const MAX_CLOCK_SKEW_SECS: u64 = 86_400;

/// OCSP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OcspConfig {
    /// Digest used for the CertID issuer name and key hashes
    ///
    /// Some responders only recognise SHA-1 identifiers.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Timeout for the whole HTTP exchange, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attach a nonce extension to each request
    #[serde(default = "default_true")]
    pub nonce_enabled: bool,

    /// Fail with `NonceMismatch` when the responder does not echo the nonce
    ///
    /// Many CA responders serve pre-signed responses without a nonce, so
    /// this is off by default.
    #[serde(default)]
    pub nonce_required: bool,

    /// Nonce length in bytes (raised to 16 if lower)
    #[serde(default = "default_nonce_len")]
    pub nonce_len: usize,

    /// Tolerance applied to thisUpdate/nextUpdate/producedAt, in seconds
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// Use HTTP GET when the encoded request is small enough
    #[serde(default)]
    pub use_get_for_small_requests: bool,

    /// Maximum accepted response body size (default 1 MB)
    #[serde(default = "default_max_response_size")]
    pub max_response_size_bytes: usize,

    /// Which keys may sign responses
    #[serde(default)]
    pub trust: TrustModel,
}

impl OcspConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS) as i64)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<(), OcspError> {
        if self.request_timeout_secs == 0 {
            return Err(OcspError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.nonce_len > MAX_NONCE_LEN {
            return Err(OcspError::Config(format!(
                "nonce_len {} exceeds maximum of {}",
                self.nonce_len, MAX_NONCE_LEN
            )));
        }
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(OcspError::Config(format!(
                "clock_skew_secs {} exceeds maximum of {}",
                self.clock_skew_secs, MAX_CLOCK_SKEW_SECS
            )));
        }
        if self.max_response_size_bytes == 0 {
            return Err(OcspError::Config(
                "max_response_size_bytes must be greater than zero".to_string(),
            ));
        }
        if let TrustModel::TrustedResponders { responders } = &self.trust {
            if responders.is_empty() {
                return Err(OcspError::Config(
                    "trusted_responders mode requires at least one responder certificate"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            request_timeout_secs: default_request_timeout(),
            nonce_enabled: true,
            nonce_required: false,
            nonce_len: default_nonce_len(),
            clock_skew_secs: default_clock_skew(),
            use_get_for_small_requests: false,
            max_response_size_bytes: default_max_response_size(),
            trust: TrustModel::default(),
        }
    }
}

/// Which keys are trusted to sign OCSP responses
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrustModel {
    /// The issuer's own key, or an embedded responder certificate issued by
    /// the issuer and carrying the OCSPSigning extended key usage
    #[default]
    IssuerOrDelegated,

    /// Only the issuer's own key
    IssuerOnly,

    /// Separately configured responder certificates (PEM), in addition to
    /// the issuer and delegated signers
    TrustedResponders { responders: Vec<String> },
}

impl TrustModel {
    /// Load the configured responder certificates
    ///
    /// Empty for the issuer-based modes.
    pub fn responder_certificates(&self) -> Result<Vec<Certificate>, OcspError> {
        match self {
            TrustModel::TrustedResponders { responders } => responders
                .iter()
                .map(|pem| cert::load(pem.as_bytes(), CertificateFormat::Pem))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Whether embedded delegated signer certificates may be used
    pub fn allows_delegated(&self) -> bool {
        !matches!(self, TrustModel::IssuerOnly)
    }
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10 // 10 seconds
}

fn default_nonce_len() -> usize {
    32
}

fn default_clock_skew() -> u64 {
    300 // 5 minutes
}

fn default_max_response_size() -> usize {
    1024 * 1024 // 1 MB
}
