//! OCSP client facade
//!
//! [`OcspClient::check_status`] runs one complete exchange:
//! load → build → send → parse → validate → resolve. Every stage reports its
//! own error and the first failure is returned unchanged.
//!
//! The client holds only configuration and an HTTP client handle. Calls
//! share no per-call state and may run concurrently.

use crate::cache::OcspCache;
use crate::cert::{self, Certificate, CertificateFormat};
use crate::config::OcspConfig;
use crate::error::OcspError;
use crate::request::{self, RequestOptions};
use crate::resolve::{self, CheckResult};
use crate::response::OcspResponse;
use crate::transport::HttpTransport;
use crate::validate::{self, TrustAnchors, ValidationContext};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Caller-side identifier of the entity being checked, used only for logging
    pub entity: Option<String>,
}

impl CheckOptions {
    pub fn for_entity(entity: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
        }
    }
}

/// OCSP client for querying responders
#[derive(Debug, Clone)]
pub struct OcspClient {
    config: OcspConfig,
    trust: TrustAnchors,
    transport: HttpTransport,
    cache: Option<Arc<OcspCache>>,
}

impl OcspClient {
    /// Create a client, validating the configuration and loading any
    /// trusted responder certificates
    pub fn new(config: OcspConfig) -> Result<Self, OcspError> {
        config.validate()?;
        let trust = TrustAnchors::from_model(&config.trust)?;
        let transport = HttpTransport::new(&config)?;

        Ok(Self {
            config,
            trust,
            transport,
            cache: None,
        })
    }

    /// Attach a result cache, consulted before and filled after each exchange
    pub fn with_cache(mut self, cache: Arc<OcspCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &OcspConfig {
        &self.config
    }

    /// Check the status of a certificate given as PEM, DER or bare base64 bytes
    pub async fn check_status(
        &self,
        subject: &[u8],
        issuer: &[u8],
        url: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult, OcspError> {
        let subject = cert::load(subject, CertificateFormat::Auto)?;
        let issuer = cert::load(issuer, CertificateFormat::Auto)?;
        self.check_certificates(&subject, &issuer, url, options).await
    }

    /// Check the status of already-loaded certificates
    pub async fn check_certificates(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        url: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult, OcspError> {
        let span = info_span!(
            "ocsp_check",
            entity = options.entity.as_deref().unwrap_or("-"),
            serial = %subject.serial_hex(),
            url = %url,
        );

        self.run(subject, issuer, url).instrument(span).await
    }

    async fn run(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        url: &str,
    ) -> Result<CheckResult, OcspError> {
        let request = request::build(subject, issuer, &RequestOptions::from(&self.config))?;

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(request.cert_id()) {
                debug!(status = ?cached.status(), "OCSP cache hit");
                return Ok(cached);
            }
        }

        let timeout = self.config.request_timeout();
        let body = self.transport.send(url, request.der(), timeout).await?;
        let response = OcspResponse::parse(&body)?;

        let ctx = ValidationContext {
            expected_cert_id: request.cert_id(),
            sent_nonce: request.nonce(),
            issuer,
            trust: &self.trust,
            now: Utc::now(),
            clock_skew: self.config.clock_skew(),
            nonce_required: self.config.nonce_required,
        };
        let validated = validate::validate(response, &ctx)?;
        let result = resolve::resolve(validated);

        info!(
            status = %result.status(),
            this_update = %result.this_update(),
            next_update = ?result.next_update(),
            "OCSP status resolved"
        );

        if let Some(cache) = &self.cache {
            cache.insert(request.cert_id().clone(), &result);
        }

        Ok(result)
    }
}

/// Extract the OCSP responder URL from a certificate's AIA extension
pub fn extract_ocsp_url(cert: &Certificate) -> Result<String, OcspError> {
    cert.ocsp_url()
}
