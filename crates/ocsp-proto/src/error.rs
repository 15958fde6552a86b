//! OCSP error types
//!
//! Every stage of a status check fails with its own variant. A revoked or
//! unknown certificate is never an error: those are `CertStatus` values on
//! a successful `CheckResult`.

use crate::response::OcspResponseStatus;
use std::time::Duration;

/// Errors that can occur during an OCSP status check
#[derive(Debug, thiserror::Error)]
pub enum OcspError {
    /// Certificate bytes could not be decoded
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Input is neither PEM, DER nor bare base64, or carries a non-certificate PEM label
    #[error("Unsupported certificate format: {0}")]
    UnsupportedFormat(String),

    /// Issuer name or public key could not be extracted
    #[error("Missing issuer information: {0}")]
    MissingIssuerInfo(String),

    /// Certificate names no OCSP responder in its AIA extension
    #[error("No OCSP responder URL in certificate: {0}")]
    MissingResponderUrl(String),

    /// HTTP exchange did not complete in time
    #[error("OCSP request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP failure: non-2xx status, connection, DNS or TLS error
    #[error("OCSP transport error: {cause}")]
    Transport {
        status_code: Option<u16>,
        cause: String,
    },

    /// Responder answered with a non-successful OCSPResponseStatus
    #[error("OCSP responder returned error status: {0}")]
    ResponderError(OcspResponseStatus),

    /// Response bytes are not a well-formed OCSP response
    #[error("Malformed OCSP response: {0}")]
    MalformedResponse(String),

    /// No trusted key verifies the response signature
    #[error("OCSP response signature invalid: {0}")]
    SignatureInvalid(String),

    /// Response nonce does not echo the request nonce
    #[error("OCSP response nonce does not match request nonce")]
    NonceMismatch,

    /// No SingleResponse matches the requested CertID
    #[error("OCSP response contains no entry matching the requested CertID")]
    CertIdMismatch,

    /// Response is outside its thisUpdate/nextUpdate window
    #[error("Stale OCSP response: {0}")]
    StaleResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Broad error classes, used by callers to decide on retry and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller must fix its inputs
    Input,
    /// Network-level failure, retryable with backoff
    Transport,
    /// Responder or response failed validation; the response must not be reused
    Protocol,
    /// Invalid client configuration
    Config,
}

impl OcspError {
    /// Non-2xx HTTP status from the responder
    pub fn http_status(status_code: u16) -> Self {
        OcspError::Transport {
            status_code: Some(status_code),
            cause: format!("OCSP responder returned HTTP {}", status_code),
        }
    }

    /// Connection-level failure with no HTTP status
    pub fn transport(cause: impl Into<String>) -> Self {
        OcspError::Transport {
            status_code: None,
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OcspError::MalformedCertificate(_)
            | OcspError::UnsupportedFormat(_)
            | OcspError::MissingIssuerInfo(_)
            | OcspError::MissingResponderUrl(_) => ErrorKind::Input,
            OcspError::Timeout(_) | OcspError::Transport { .. } => ErrorKind::Transport,
            OcspError::ResponderError(_)
            | OcspError::MalformedResponse(_)
            | OcspError::SignatureInvalid(_)
            | OcspError::NonceMismatch
            | OcspError::CertIdMismatch
            | OcspError::StaleResponse(_) => ErrorKind::Protocol,
            OcspError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether retrying the same exchange may succeed
    ///
    /// Only transport failures qualify. A protocol failure may be retried as
    /// a whole new exchange (fresh nonce), which is the caller's decision.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}
