//! OCSP request building (RFC 6960 Section 4.1)
//!
//! ```asn1
//! OCSPRequest ::= SEQUENCE {
//!     tbsRequest      TBSRequest,
//!     optionalSignature   [0] EXPLICIT Signature OPTIONAL
//! }
//!
//! TBSRequest ::= SEQUENCE {
//!     version             [0] EXPLICIT Version DEFAULT v1,
//!     requestorName       [1] EXPLICIT GeneralName OPTIONAL,
//!     requestList         SEQUENCE OF Request,
//!     requestExtensions   [2] EXPLICIT Extensions OPTIONAL
//! }
//!
//! Request ::= SEQUENCE {
//!     reqCert             CertID,
//!     singleRequestExtensions [0] EXPLICIT Extensions OPTIONAL
//! }
//!
//! CertID ::= SEQUENCE {
//!     hashAlgorithm       AlgorithmIdentifier,
//!     issuerNameHash      OCTET STRING,
//!     issuerKeyHash       OCTET STRING,
//!     serialNumber        INTEGER
//! }
//! ```
//!
//! Requests are never signed. One CertID is sent per request.

use crate::cert::Certificate;
use crate::config::{OcspConfig, MAX_NONCE_LEN};
use crate::der::{self, tag, DerElement};
use crate::error::OcspError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// id-pkix-ocsp-nonce (1.3.6.1.5.5.7.48.1.2)
pub const NONCE_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 2];

/// Shortest nonce the builder will attach
pub const MIN_NONCE_LEN: usize = 16;

/// Digest used for CertID issuer hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// OID arcs of the digest algorithm
    pub fn oid(&self) -> &'static [u64] {
        match self {
            HashAlgorithm::Sha1 => &[1, 3, 14, 3, 2, 26],
            HashAlgorithm::Sha256 => &[2, 16, 840, 1, 101, 3, 4, 2, 1],
            HashAlgorithm::Sha384 => &[2, 16, 840, 1, 101, 3, 4, 2, 2],
            HashAlgorithm::Sha512 => &[2, 16, 840, 1, 101, 3, 4, 2, 3],
        }
    }

    /// Match OID content octets back to an algorithm
    pub fn from_oid_contents(contents: &[u8]) -> Option<Self> {
        [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| der::oid_contents(alg.oid()) == contents)
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = OcspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(OcspError::Config(format!(
                "unknown hash algorithm '{}'",
                other
            ))),
        }
    }
}

/// Certificate identifier correlating a request entry with a response entry
///
/// The hash algorithm is kept as OID content octets so identifiers using
/// digests this client does not produce can still be parsed and compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertId {
    hash_algorithm: Vec<u8>,
    issuer_name_hash: Vec<u8>,
    issuer_key_hash: Vec<u8>,
    serial_number: Vec<u8>,
}

impl CertId {
    /// Derive the CertID of `subject` as issued by `issuer`
    pub fn new(
        subject: &Certificate,
        issuer: &Certificate,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self, OcspError> {
        // An empty Name still encodes as SEQUENCE {} (two bytes)
        if issuer.subject_raw().len() <= 2 {
            return Err(OcspError::MissingIssuerInfo(
                "issuer certificate has an empty subject name".to_string(),
            ));
        }
        if issuer.public_key().is_empty() {
            return Err(OcspError::MissingIssuerInfo(
                "issuer certificate has an empty public key".to_string(),
            ));
        }

        Ok(Self {
            hash_algorithm: der::oid_contents(hash_algorithm.oid()),
            issuer_name_hash: hash_algorithm.digest(issuer.subject_raw()),
            issuer_key_hash: hash_algorithm.digest(issuer.public_key()),
            serial_number: subject.serial().to_vec(),
        })
    }

    /// Decode a CertID SEQUENCE
    pub fn from_der_element(element: DerElement<'_>) -> Result<Self, OcspError> {
        let mut fields = element
            .expect_tag(tag::SEQUENCE, "CertID")?
            .reader("CertID");

        let mut alg = fields.expect(tag::SEQUENCE)?.reader("CertID.hashAlgorithm");
        let oid = alg.expect(tag::OID)?;
        // parameters are NULL or absent
        alg.optional(tag::NULL)?;
        alg.finish()?;

        let issuer_name_hash = fields.expect(tag::OCTET_STRING)?;
        let issuer_key_hash = fields.expect(tag::OCTET_STRING)?;
        let serial_number = fields.expect(tag::INTEGER)?;
        fields.finish()?;

        Ok(Self {
            hash_algorithm: oid.contents.to_vec(),
            issuer_name_hash: issuer_name_hash.contents.to_vec(),
            issuer_key_hash: issuer_key_hash.contents.to_vec(),
            serial_number: serial_number.contents.to_vec(),
        })
    }

    /// Deterministic DER encoding
    pub fn to_der(&self) -> Vec<u8> {
        let mut alg = der::tlv(tag::OID, &self.hash_algorithm);
        alg.extend_from_slice(&der::null());

        let mut cert_id = der::sequence(&alg);
        cert_id.extend_from_slice(&der::octet_string(&self.issuer_name_hash));
        cert_id.extend_from_slice(&der::octet_string(&self.issuer_key_hash));
        cert_id.extend_from_slice(&der::integer_raw(&self.serial_number));
        der::sequence(&cert_id)
    }

    /// Whether all four fields are equal
    pub fn matches(&self, other: &CertId) -> bool {
        self == other
    }

    /// The digest algorithm, when it is one this client knows
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_oid_contents(&self.hash_algorithm)
    }

    pub fn issuer_name_hash(&self) -> &[u8] {
        &self.issuer_name_hash
    }

    pub fn issuer_key_hash(&self) -> &[u8] {
        &self.issuer_key_hash
    }

    /// Serial number content octets
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial_number)
    }
}

/// A built, DER-encoded OCSP request
#[derive(Debug, Clone)]
pub struct OcspRequest {
    cert_ids: Vec<CertId>,
    nonce: Option<Vec<u8>>,
    der: Vec<u8>,
}

impl OcspRequest {
    /// The CertIDs in request order
    pub fn cert_ids(&self) -> &[CertId] {
        &self.cert_ids
    }

    /// The single CertID this client requests
    pub fn cert_id(&self) -> &CertId {
        // OcspRequestBuilder always emits exactly one
        &self.cert_ids[0]
    }

    pub fn nonce(&self) -> Option<&[u8]> {
        self.nonce.as_deref()
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// OCSP request builder
///
/// Builds an unsigned OCSP request for a single certificate.
pub struct OcspRequestBuilder<'a> {
    subject: &'a Certificate,
    issuer: &'a Certificate,
    hash_algorithm: HashAlgorithm,
    nonce: Option<Vec<u8>>,
}

impl<'a> OcspRequestBuilder<'a> {
    /// Create a builder for `subject`, issued by `issuer`
    pub fn new(subject: &'a Certificate, issuer: &'a Certificate) -> Self {
        Self {
            subject,
            issuer,
            hash_algorithm: HashAlgorithm::default(),
            nonce: None,
        }
    }

    pub fn hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    /// Attach a caller-supplied nonce of 16 to 128 bytes
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Result<Self, OcspError> {
        if nonce.len() < MIN_NONCE_LEN || nonce.len() > MAX_NONCE_LEN {
            return Err(OcspError::Config(format!(
                "nonce must be {} to {} bytes, got {}",
                MIN_NONCE_LEN,
                MAX_NONCE_LEN,
                nonce.len()
            )));
        }
        self.nonce = Some(nonce);
        Ok(self)
    }

    /// Attach a fresh random nonce of `len` bytes, clamped to 16..=128
    pub fn with_random_nonce(mut self, len: usize) -> Self {
        let mut nonce = vec![0u8; len.clamp(MIN_NONCE_LEN, MAX_NONCE_LEN)];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.nonce = Some(nonce);
        self
    }

    /// Build the DER-encoded OCSPRequest
    pub fn build(self) -> Result<OcspRequest, OcspError> {
        if self.subject.issuer_raw() != self.issuer.subject_raw() {
            warn!(
                subject_issuer = %self.subject.issuer(),
                issuer_subject = %self.issuer.subject(),
                "issuer certificate does not match the subject's issuer name"
            );
        }

        let cert_id = CertId::new(self.subject, self.issuer, self.hash_algorithm)?;

        // Request ::= SEQUENCE { reqCert }
        let request = der::sequence(&cert_id.to_der());

        // TBSRequest: version omitted (v1), no requestorName
        let mut tbs = der::sequence(&request);
        if let Some(nonce) = &self.nonce {
            tbs.extend_from_slice(&der::explicit(2, &nonce_extensions(nonce)));
        }
        let tbs_request = der::sequence(&tbs);

        // OCSPRequest without optionalSignature
        let der = der::sequence(&tbs_request);

        debug!(
            serial = %cert_id.serial_hex(),
            hash = %self.hash_algorithm,
            nonce = self.nonce.is_some(),
            size = der.len(),
            "Built OCSP request"
        );

        Ok(OcspRequest {
            cert_ids: vec![cert_id],
            nonce: self.nonce,
            der,
        })
    }
}

/// Options for [`build`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub hash_algorithm: HashAlgorithm,
    pub include_nonce: bool,
    pub nonce_len: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            include_nonce: true,
            nonce_len: 32,
        }
    }
}

impl From<&OcspConfig> for RequestOptions {
    fn from(config: &OcspConfig) -> Self {
        Self {
            hash_algorithm: config.hash_algorithm,
            include_nonce: config.nonce_enabled,
            nonce_len: config.nonce_len,
        }
    }
}

/// Build an OCSP request for `subject` issued by `issuer`
pub fn build(
    subject: &Certificate,
    issuer: &Certificate,
    options: &RequestOptions,
) -> Result<OcspRequest, OcspError> {
    let builder = OcspRequestBuilder::new(subject, issuer).hash_algorithm(options.hash_algorithm);
    let builder = if options.include_nonce {
        builder.with_random_nonce(options.nonce_len)
    } else {
        builder
    };
    builder.build()
}

/// Extensions ::= SEQUENCE OF Extension, holding just the nonce
///
/// ```asn1
/// Extension ::= SEQUENCE {
///     extnID      OBJECT IDENTIFIER,
///     critical    BOOLEAN DEFAULT FALSE,
///     extnValue   OCTET STRING
/// }
/// ```
fn nonce_extensions(nonce: &[u8]) -> Vec<u8> {
    let mut ext = der::oid(NONCE_OID);
    // extnValue wraps the nonce in its own OCTET STRING
    ext.extend_from_slice(&der::octet_string(&der::octet_string(nonce)));
    der::sequence(&der::sequence(&ext))
}
