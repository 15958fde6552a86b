//! OCSP response parsing (RFC 6960 Section 4.2)
//!
//! ```asn1
//! OCSPResponse ::= SEQUENCE {
//!     responseStatus      OCSPResponseStatus,
//!     responseBytes       [0] EXPLICIT ResponseBytes OPTIONAL
//! }
//!
//! BasicOCSPResponse ::= SEQUENCE {
//!     tbsResponseData     ResponseData,
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signature           BIT STRING,
//!     certs               [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL
//! }
//!
//! ResponseData ::= SEQUENCE {
//!     version             [0] EXPLICIT Version DEFAULT v1,
//!     responderID         ResponderID,
//!     producedAt          GeneralizedTime,
//!     responses           SEQUENCE OF SingleResponse,
//!     responseExtensions  [1] EXPLICIT Extensions OPTIONAL
//! }
//!
//! SingleResponse ::= SEQUENCE {
//!     certID              CertID,
//!     certStatus          CertStatus,
//!     thisUpdate          GeneralizedTime,
//!     nextUpdate          [0] EXPLICIT GeneralizedTime OPTIONAL,
//!     singleExtensions    [1] EXPLICIT Extensions OPTIONAL
//! }
//!
//! CertStatus ::= CHOICE {
//!     good                [0] IMPLICIT NULL,
//!     revoked             [1] IMPLICIT RevokedInfo,
//!     unknown             [2] IMPLICIT UnknownInfo
//! }
//! ```
//!
//! Parsing is purely structural. Nothing here is trusted until
//! [`crate::validate::validate`] has checked the signature.

use crate::cert::Certificate;
use crate::der::{self, tag, DerElement};
use crate::error::OcspError;
use crate::request::{CertId, NONCE_OID};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

/// id-pkix-ocsp-basic (1.3.6.1.5.5.7.48.1.1)
pub const BASIC_RESPONSE_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 1];

/// OCSP response status (RFC 6960 Section 2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcspResponseStatus {
    /// Response has valid confirmations
    Successful = 0,
    /// Illegal confirmation request
    MalformedRequest = 1,
    /// Internal error in issuer
    InternalError = 2,
    /// Try again later
    TryLater = 3,
    /// Must sign the request
    SigRequired = 5,
    /// Request unauthorized
    Unauthorized = 6,
}

impl OcspResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OcspResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Successful => "successful",
            Self::MalformedRequest => "malformedRequest",
            Self::InternalError => "internalError",
            Self::TryLater => "tryLater",
            Self::SigRequired => "sigRequired",
            Self::Unauthorized => "unauthorized",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Revocation reason (RFC 5280 CRLReason)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    /// Map a CRLReason code; 7 is unassigned
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::KeyCompromise => 1,
            Self::CaCompromise => 2,
            Self::AffiliationChanged => 3,
            Self::Superseded => 4,
            Self::CessationOfOperation => 5,
            Self::CertificateHold => 6,
            Self::RemoveFromCrl => 8,
            Self::PrivilegeWithdrawn => 9,
            Self::AaCompromise => 10,
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CaCompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCrl => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AaCompromise => "aACompromise",
        };
        f.write_str(name)
    }
}

/// Certificate status reported by the responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertStatus {
    /// Certificate is not revoked
    Good,
    /// Certificate has been revoked
    Revoked {
        revocation_time: DateTime<Utc>,
        reason: Option<RevocationReason>,
    },
    /// Responder does not know the certificate
    Unknown,
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertStatus::Good => f.write_str("good"),
            CertStatus::Revoked {
                revocation_time,
                reason: Some(reason),
            } => write!(f, "revoked at {} ({})", revocation_time, reason),
            CertStatus::Revoked {
                revocation_time, ..
            } => write!(f, "revoked at {}", revocation_time),
            CertStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// Responder identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER encoding of the responder's Name
    ByName(Vec<u8>),
    /// SHA-1 of the responder's public key bit string
    ByKey(Vec<u8>),
}

impl ResponderId {
    /// Whether `cert` is the responder this identifier names
    pub fn identifies(&self, cert: &Certificate) -> bool {
        match self {
            ResponderId::ByName(name) => name.as_slice() == cert.subject_raw(),
            ResponderId::ByKey(hash) => Sha1::digest(cert.public_key()).as_slice() == hash.as_slice(),
        }
    }
}

/// One entry of the `responses` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// Parsed (not yet validated) OCSP response
#[derive(Debug, Clone)]
pub struct OcspResponse {
    pub responder_id: ResponderId,
    pub produced_at: DateTime<Utc>,
    pub responses: Vec<SingleResponse>,
    /// Signature algorithm OID content octets
    pub signature_algorithm: Vec<u8>,
    pub signature: Vec<u8>,
    /// Exact `tbsResponseData` encoding the signature covers
    pub tbs_response_data: Vec<u8>,
    /// Nonce echoed in the response extensions
    pub nonce: Option<Vec<u8>>,
    /// DER certificates embedded by the responder
    pub certs: Vec<Vec<u8>>,
    /// Raw response bytes (for caching)
    pub raw_bytes: Vec<u8>,
}

impl OcspResponse {
    /// Parse an OCSP response from DER-encoded bytes
    ///
    /// A non-successful `responseStatus` is reported as
    /// [`OcspError::ResponderError`].
    pub fn parse(der_bytes: &[u8]) -> Result<Self, OcspError> {
        let outer = DerElement::parse_single(der_bytes, "OCSPResponse")?
            .expect_tag(tag::SEQUENCE, "OCSPResponse")?;
        let mut fields = outer.reader("OCSPResponse");

        let status_code = fields.expect(tag::ENUMERATED)?.small_uint("responseStatus")?;
        let status = u8::try_from(status_code)
            .ok()
            .and_then(OcspResponseStatus::from_u8)
            .ok_or_else(|| {
                OcspError::MalformedResponse(format!(
                    "Unknown OCSP response status: {}",
                    status_code
                ))
            })?;

        if status != OcspResponseStatus::Successful {
            return Err(OcspError::ResponderError(status));
        }

        let response_bytes = fields
            .optional(tag::context(0))?
            .ok_or_else(|| {
                OcspError::MalformedResponse("OCSP response missing responseBytes".to_string())
            })?;
        fields.finish()?;

        // ResponseBytes ::= SEQUENCE { responseType OID, response OCTET STRING }
        let mut explicit = response_bytes.reader("responseBytes");
        let response_bytes_seq = explicit.expect(tag::SEQUENCE)?;
        explicit.finish()?;

        let mut rb = response_bytes_seq.reader("ResponseBytes");
        let response_type = rb.expect(tag::OID)?;
        let basic = rb.expect(tag::OCTET_STRING)?;
        rb.finish()?;

        if response_type.contents != der::oid_contents(BASIC_RESPONSE_OID).as_slice() {
            return Err(OcspError::MalformedResponse(format!(
                "Unsupported OCSP response type: {}",
                hex::encode(response_type.contents)
            )));
        }

        let mut response = parse_basic_response(basic.contents)?;
        response.raw_bytes = der_bytes.to_vec();

        debug!(
            produced_at = %response.produced_at,
            responses = response.responses.len(),
            certs = response.certs.len(),
            nonce = response.nonce.is_some(),
            "Parsed OCSP response"
        );

        Ok(response)
    }
}

fn parse_basic_response(bytes: &[u8]) -> Result<OcspResponse, OcspError> {
    let basic = DerElement::parse_single(bytes, "BasicOCSPResponse")?
        .expect_tag(tag::SEQUENCE, "BasicOCSPResponse")?;
    let mut fields = basic.reader("BasicOCSPResponse");

    let tbs = fields.expect(tag::SEQUENCE)?;

    let mut alg = fields.expect(tag::SEQUENCE)?.reader("signatureAlgorithm");
    let signature_algorithm = alg.expect(tag::OID)?.contents.to_vec();
    // parameters (NULL, absent or algorithm specific) are not needed

    let signature = fields
        .expect(tag::BIT_STRING)?
        .bit_string_bytes("signature")?
        .to_vec();

    let mut certs = Vec::new();
    if let Some(explicit) = fields.optional(tag::context(0))? {
        let mut inner = explicit.reader("certs");
        let list = inner.expect(tag::SEQUENCE)?;
        inner.finish()?;
        for cert in list.reader("certs") {
            certs.push(cert?.expect_tag(tag::SEQUENCE, "certs")?.raw.to_vec());
        }
    }
    fields.finish()?;

    let data = parse_response_data(tbs)?;

    Ok(OcspResponse {
        responder_id: data.responder_id,
        produced_at: data.produced_at,
        responses: data.responses,
        signature_algorithm,
        signature,
        tbs_response_data: tbs.raw.to_vec(),
        nonce: data.nonce,
        certs,
        raw_bytes: Vec::new(),
    })
}

struct ResponseData {
    responder_id: ResponderId,
    produced_at: DateTime<Utc>,
    responses: Vec<SingleResponse>,
    nonce: Option<Vec<u8>>,
}

fn parse_response_data(tbs: DerElement<'_>) -> Result<ResponseData, OcspError> {
    let mut fields = tbs.reader("ResponseData");

    if let Some(version) = fields.optional(tag::context(0))? {
        let mut inner = version.reader("version");
        let v = inner.expect(tag::INTEGER)?.small_uint("version")?;
        inner.finish()?;
        if v != 0 {
            return Err(OcspError::MalformedResponse(format!(
                "Unsupported ResponseData version: {}",
                v + 1
            )));
        }
    }

    let responder = fields.next_element()?;
    let responder_id = match responder.tag {
        t if t == tag::context(1) => {
            let mut inner = responder.reader("responderID");
            let name = inner.expect(tag::SEQUENCE)?;
            inner.finish()?;
            ResponderId::ByName(name.raw.to_vec())
        }
        t if t == tag::context(2) => {
            let mut inner = responder.reader("responderID");
            let key_hash = inner.expect(tag::OCTET_STRING)?;
            inner.finish()?;
            ResponderId::ByKey(key_hash.contents.to_vec())
        }
        other => {
            return Err(OcspError::MalformedResponse(format!(
                "Invalid responderID tag 0x{:02X}",
                other
            )))
        }
    };

    let produced_at = fields.next_element()?.generalized_time("producedAt")?;

    let mut responses = Vec::new();
    for single in fields.expect(tag::SEQUENCE)?.reader("responses") {
        responses.push(parse_single_response(single?)?);
    }
    if responses.is_empty() {
        return Err(OcspError::MalformedResponse(
            "No SingleResponse in OCSP response".to_string(),
        ));
    }

    let mut nonce = None;
    if let Some(explicit) = fields.optional(tag::context(1))? {
        for ext in parse_extensions(explicit, "responseExtensions")? {
            if ext.oid == der::oid_contents(NONCE_OID).as_slice() {
                nonce = Some(nonce_value(ext.value));
            } else if ext.critical {
                return Err(unknown_critical(&ext, "responseExtensions"));
            }
        }
    }
    fields.finish()?;

    Ok(ResponseData {
        responder_id,
        produced_at,
        responses,
        nonce,
    })
}

fn parse_single_response(element: DerElement<'_>) -> Result<SingleResponse, OcspError> {
    let mut fields = element
        .expect_tag(tag::SEQUENCE, "SingleResponse")?
        .reader("SingleResponse");

    let cert_id = CertId::from_der_element(fields.next_element()?)?;
    let status = parse_cert_status(fields.next_element()?)?;
    let this_update = fields.next_element()?.generalized_time("thisUpdate")?;

    let next_update = match fields.optional(tag::context(0))? {
        Some(explicit) => {
            let mut inner = explicit.reader("nextUpdate");
            let time = inner.next_element()?.generalized_time("nextUpdate")?;
            inner.finish()?;
            Some(time)
        }
        None => None,
    };

    if let Some(explicit) = fields.optional(tag::context(1))? {
        for ext in parse_extensions(explicit, "singleExtensions")? {
            if ext.critical {
                return Err(unknown_critical(&ext, "singleExtensions"));
            }
        }
    }
    fields.finish()?;

    Ok(SingleResponse {
        cert_id,
        status,
        this_update,
        next_update,
    })
}

/// ```asn1
/// RevokedInfo ::= SEQUENCE {
///     revocationTime      GeneralizedTime,
///     revocationReason    [0] EXPLICIT CRLReason OPTIONAL
/// }
/// ```
fn parse_cert_status(element: DerElement<'_>) -> Result<CertStatus, OcspError> {
    match element.tag {
        t if t == tag::context_primitive(0) => Ok(CertStatus::Good),
        t if t == tag::context(1) => {
            let mut info = element.reader("RevokedInfo");
            let revocation_time = info.next_element()?.generalized_time("revocationTime")?;
            let reason = match info.optional(tag::context(0))? {
                Some(explicit) => {
                    let mut inner = explicit.reader("revocationReason");
                    let code = inner
                        .expect(tag::ENUMERATED)?
                        .small_uint("revocationReason")?;
                    inner.finish()?;
                    Some(RevocationReason::from_code(code).ok_or_else(|| {
                        OcspError::MalformedResponse(format!(
                            "Invalid revocation reason code: {}",
                            code
                        ))
                    })?)
                }
                None => None,
            };
            info.finish()?;
            Ok(CertStatus::Revoked {
                revocation_time,
                reason,
            })
        }
        t if t == tag::context_primitive(2) => Ok(CertStatus::Unknown),
        other => Err(OcspError::MalformedResponse(format!(
            "Invalid certStatus tag 0x{:02X}",
            other
        ))),
    }
}

struct Extension<'a> {
    oid: &'a [u8],
    critical: bool,
    value: &'a [u8],
}

/// Decode `[n] EXPLICIT Extensions`
fn parse_extensions<'a>(
    explicit: DerElement<'a>,
    context: &'static str,
) -> Result<Vec<Extension<'a>>, OcspError> {
    let mut inner = explicit.reader(context);
    let list = inner.expect(tag::SEQUENCE)?;
    inner.finish()?;

    let mut extensions = Vec::new();
    for ext in list.reader(context) {
        let mut fields = ext?.expect_tag(tag::SEQUENCE, context)?.reader(context);
        let oid = fields.expect(tag::OID)?.contents;
        let critical = match fields.optional(tag::BOOLEAN)? {
            Some(flag) => flag.contents.first().is_some_and(|b| *b != 0),
            None => false,
        };
        let value = fields.expect(tag::OCTET_STRING)?.contents;
        fields.finish()?;
        extensions.push(Extension {
            oid,
            critical,
            value,
        });
    }
    Ok(extensions)
}

/// Nonce bytes from an extnValue
///
/// RFC 8954 wraps the nonce in an inner OCTET STRING; some responders echo
/// the bare bytes instead.
fn nonce_value(extn_value: &[u8]) -> Vec<u8> {
    match DerElement::parse_single(extn_value, "nonce") {
        Ok(inner) if inner.tag == tag::OCTET_STRING => inner.contents.to_vec(),
        _ => extn_value.to_vec(),
    }
}

fn unknown_critical(ext: &Extension<'_>, context: &str) -> OcspError {
    OcspError::MalformedResponse(format!(
        "Unsupported critical extension {} in {}",
        hex::encode(ext.oid),
        context
    ))
}
