//! Certificate loading
//!
//! Turns PEM, DER or bare base64 bytes into a [`Certificate`] holding the
//! fields OCSP needs: serial number, issuer/subject names (display and raw
//! DER), public key material and the validity window.
//!
//! PEM framing is validated rather than assumed. A base64 body without
//! `BEGIN`/`END CERTIFICATE` markers is accepted and wrapped into a proper
//! PEM block before decoding.
//!
//! ```
//! use ocsp_proto::cert::{load, CertificateFormat};
//!
//! let err = load(b"-----BEGIN CERTIFICATE-----\nMIIB", CertificateFormat::Pem).unwrap_err();
//! assert!(matches!(err, ocsp_proto::OcspError::MalformedCertificate(_)));
//! ```

use crate::error::OcspError;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::oid_registry::asn1_rs::oid;
use x509_parser::prelude::*;

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Encoding of certificate input bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFormat {
    /// PEM block, or a bare base64 body without markers
    Pem,
    /// Raw DER
    Der,
    /// Detect DER vs PEM/base64 from the bytes
    Auto,
}

/// A parsed X.509 certificate
///
/// Owns its DER encoding. Immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    serial: Vec<u8>,
    subject: String,
    issuer: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    spki_raw: Vec<u8>,
    public_key: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl Certificate {
    /// Parse a certificate from DER bytes
    pub fn from_der(der: &[u8]) -> Result<Self, OcspError> {
        let (rem, cert) = parse_x509_certificate(der).map_err(|e| {
            OcspError::MalformedCertificate(format!("Failed to parse certificate: {}", e))
        })?;

        if !rem.is_empty() {
            return Err(OcspError::MalformedCertificate(format!(
                "{} trailing bytes after certificate",
                rem.len()
            )));
        }

        let spki = cert.public_key();
        let public_key: &[u8] = &spki.subject_public_key.data;

        Ok(Self {
            der: der.to_vec(),
            serial: cert.raw_serial().to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            spki_raw: spki.raw.to_vec(),
            public_key: public_key.to_vec(),
            not_before: asn1_time_to_chrono(&cert.validity().not_before)?,
            not_after: asn1_time_to_chrono(&cert.validity().not_after)?,
        })
    }

    /// Raw DER encoding
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serial number content octets, exactly as encoded in the certificate
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Serial number as lowercase hex, for logging
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// DER encoding of the subject Name
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// DER encoding of the issuer Name
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    /// DER encoding of the SubjectPublicKeyInfo
    pub fn spki_raw(&self) -> &[u8] {
        &self.spki_raw
    }

    /// Contents of the subjectPublicKey BIT STRING
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `now` falls inside the validity window, widened by `skew`
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        self.not_before - skew <= now && now <= self.not_after + skew
    }

    /// Re-parse into the borrowed `x509-parser` representation
    pub fn parsed(&self) -> Result<X509Certificate<'_>, OcspError> {
        parse_x509_certificate(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| {
                OcspError::MalformedCertificate(format!("Failed to parse certificate: {}", e))
            })
    }

    /// Whether `issuer` issued this certificate: names chain and the
    /// signature verifies under the issuer's key
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        if self.issuer_raw != issuer.subject_raw {
            return false;
        }
        let (Ok(cert), Ok(issuer_cert)) = (self.parsed(), issuer.parsed()) else {
            return false;
        };
        cert.verify_signature(Some(issuer_cert.public_key())).is_ok()
    }

    /// Whether the certificate carries the id-kp-OCSPSigning extended key usage
    pub fn has_ocsp_signing_eku(&self) -> bool {
        let Ok(cert) = self.parsed() else {
            return false;
        };
        matches!(
            cert.extended_key_usage(),
            Ok(Some(eku)) if eku.value.ocsp_signing
        )
    }

    /// Extract the OCSP responder URL from the Authority Information Access extension
    pub fn ocsp_url(&self) -> Result<String, OcspError> {
        let cert = self.parsed()?;
        let ocsp_oid = oid!(1.3.6.1.5.5.7.48.1);

        for ext in cert.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                for access_desc in aia.accessdescs.iter() {
                    if access_desc.access_method == ocsp_oid {
                        if let GeneralName::URI(uri) = &access_desc.access_location {
                            return Ok(uri.to_string());
                        }
                    }
                }
            }
        }

        Err(OcspError::MissingResponderUrl(self.subject.clone()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial_hex())
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Load a certificate from bytes
///
/// No I/O happens here: bytes in, structured certificate out.
pub fn load(bytes: &[u8], format: CertificateFormat) -> Result<Certificate, OcspError> {
    match format {
        CertificateFormat::Der => Certificate::from_der(bytes),
        CertificateFormat::Pem => Certificate::from_der(&pem_to_der(bytes)?),
        CertificateFormat::Auto => {
            if bytes.first() == Some(&0x30) {
                return Certificate::from_der(bytes);
            }
            let text = std::str::from_utf8(bytes).map_err(|_| {
                OcspError::UnsupportedFormat(
                    "input is neither DER nor PEM/base64 text".to_string(),
                )
            })?;
            if !text.contains(PEM_BEGIN) && !text.contains(PEM_END) && !is_base64_body(text) {
                return Err(OcspError::UnsupportedFormat(
                    "input is neither DER nor PEM/base64 text".to_string(),
                ));
            }
            Certificate::from_der(&pem_to_der(bytes)?)
        }
    }
}

/// Read a certificate file and load it
///
/// The file is read fully and closed before parsing.
pub fn load_file(path: impl AsRef<Path>, format: CertificateFormat) -> Result<Certificate, OcspError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        OcspError::MalformedCertificate(format!("Failed to read {}: {}", path.display(), e))
    })?;
    load(&bytes, format)
}

/// Normalise PEM input (armored or bare base64) and decode it to DER
fn pem_to_der(bytes: &[u8]) -> Result<Vec<u8>, OcspError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| OcspError::MalformedCertificate("PEM input is not UTF-8".to_string()))?;

    let armored = match (text.find(PEM_BEGIN), text.find(PEM_END)) {
        (Some(begin), Some(end)) if begin < end => {
            let label = pem_label(&text[begin + PEM_BEGIN.len()..])?;
            if label != CERTIFICATE_LABEL {
                return Err(OcspError::UnsupportedFormat(format!(
                    "PEM block labelled '{}' is not a certificate",
                    label
                )));
            }
            let footer = format!("{}{}-----", PEM_END, label);
            if !text[begin..].contains(&footer) {
                return Err(OcspError::MalformedCertificate(format!(
                    "PEM footer '{}' not found",
                    footer
                )));
            }
            text[begin..].to_string()
        }
        (Some(_), _) => {
            return Err(OcspError::MalformedCertificate(
                "PEM header without matching footer".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(OcspError::MalformedCertificate(
                "PEM footer without matching header".to_string(),
            ))
        }
        (None, None) => wrap_bare_base64(text)?,
    };

    let (_, pem) = x509_parser::pem::parse_x509_pem(armored.as_bytes()).map_err(|e| {
        OcspError::MalformedCertificate(format!("Failed to parse certificate PEM: {}", e))
    })?;

    Ok(pem.contents)
}

/// Label of a PEM block, given the text just after `-----BEGIN `
fn pem_label(after_begin: &str) -> Result<&str, OcspError> {
    after_begin
        .find("-----")
        .map(|end| after_begin[..end].trim())
        .ok_or_else(|| OcspError::MalformedCertificate("Unterminated PEM header".to_string()))
}

/// Wrap a marker-less base64 body in CERTIFICATE armor
fn wrap_bare_base64(text: &str) -> Result<String, OcspError> {
    let body: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if body.is_empty() {
        return Err(OcspError::MalformedCertificate(
            "empty certificate input".to_string(),
        ));
    }
    // Decode up front so a garbage body surfaces as a base64 problem, not a PEM one
    BASE64_STANDARD
        .decode(body.as_bytes())
        .map_err(|e| OcspError::MalformedCertificate(format!("Invalid base64 body: {}", e)))?;

    let mut pem = format!("{}{}-----\n", PEM_BEGIN, CERTIFICATE_LABEL);
    for chunk in body.as_bytes().chunks(64) {
        // chunks of an ASCII string stay valid UTF-8
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("{}{}-----\n", PEM_END, CERTIFICATE_LABEL));
    Ok(pem)
}

fn is_base64_body(text: &str) -> bool {
    let mut saw_char = false;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        if !(c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
            return false;
        }
        saw_char = true;
    }
    saw_char
}

fn asn1_time_to_chrono(time: &ASN1Time) -> Result<DateTime<Utc>, OcspError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        OcspError::MalformedCertificate("certificate validity out of range".to_string())
    })
}
