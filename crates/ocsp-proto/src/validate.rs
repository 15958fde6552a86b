//! OCSP response validation
//!
//! A parsed [`OcspResponse`] is only trusted after [`validate`] has checked,
//! in order:
//!
//! 1. the signature over `tbsResponseData`, under the configured
//!    [`TrustModel`], by a key the ResponderID names;
//! 2. the nonce echo against the nonce that was sent;
//! 3. that one `SingleResponse` carries the requested CertID;
//! 4. the `thisUpdate` / `nextUpdate` / `producedAt` freshness window.
//!
//! Each check fails with its own [`OcspError`] variant. The only way to
//! obtain a [`ValidatedResponse`] is through this module.

use crate::cert::Certificate;
use crate::config::TrustModel;
use crate::der::{self, tag, DerElement};
use crate::error::OcspError;
use crate::request::CertId;
use crate::response::{CertStatus, OcspResponse, SingleResponse};
use chrono::{DateTime, Utc};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use tracing::{debug, warn};

const RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];
const SHA256_WITH_RSA: &[u64] = &[1, 2, 840, 113549, 1, 1, 11];
const SHA384_WITH_RSA: &[u64] = &[1, 2, 840, 113549, 1, 1, 12];
const SHA512_WITH_RSA: &[u64] = &[1, 2, 840, 113549, 1, 1, 13];
const EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];
const ECDSA_WITH_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
const ECDSA_WITH_SHA384: &[u64] = &[1, 2, 840, 10045, 4, 3, 3];
const ED25519: &[u64] = &[1, 3, 101, 112];
const CURVE_P256: &[u64] = &[1, 2, 840, 10045, 3, 1, 7];
const CURVE_P384: &[u64] = &[1, 3, 132, 0, 34];

/// Keys allowed to sign responses, resolved from a [`TrustModel`]
#[derive(Debug, Clone)]
pub struct TrustAnchors {
    allow_delegated: bool,
    responders: Vec<Certificate>,
}

impl TrustAnchors {
    /// Resolve a trust model, loading any configured responder certificates
    pub fn from_model(model: &TrustModel) -> Result<Self, OcspError> {
        Ok(Self {
            allow_delegated: model.allows_delegated(),
            responders: model.responder_certificates()?,
        })
    }

    /// Trust the issuer key and delegated signers (the default model)
    pub fn issuer_or_delegated() -> Self {
        Self {
            allow_delegated: true,
            responders: Vec::new(),
        }
    }

    /// Trust only the issuer key
    pub fn issuer_only() -> Self {
        Self {
            allow_delegated: false,
            responders: Vec::new(),
        }
    }

    /// Trust the given responder certificates in addition to the issuer and
    /// delegated signers
    pub fn trusted_responders(responders: Vec<Certificate>) -> Self {
        Self {
            allow_delegated: true,
            responders,
        }
    }
}

impl Default for TrustAnchors {
    fn default() -> Self {
        Self::issuer_or_delegated()
    }
}

/// Everything the validator compares a response against
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    pub expected_cert_id: &'a CertId,
    pub sent_nonce: Option<&'a [u8]>,
    pub issuer: &'a Certificate,
    pub trust: &'a TrustAnchors,
    pub now: DateTime<Utc>,
    pub clock_skew: chrono::Duration,
    pub nonce_required: bool,
}

/// Which key verified the response signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signer {
    /// The issuing CA itself
    Issuer,
    /// An embedded certificate delegated by the issuer (subject DN)
    Delegated(String),
    /// A configured trusted responder (subject DN)
    TrustedResponder(String),
}

/// A response that passed every validation step
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    single: SingleResponse,
    produced_at: DateTime<Utc>,
    signer: Signer,
    raw_bytes: Vec<u8>,
}

impl ValidatedResponse {
    pub fn status(&self) -> &CertStatus {
        &self.single.status
    }

    pub fn cert_id(&self) -> &CertId {
        &self.single.cert_id
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.single.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.single.next_update
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub(crate) fn into_parts(self) -> (SingleResponse, DateTime<Utc>, Vec<u8>) {
        (self.single, self.produced_at, self.raw_bytes)
    }
}

/// Validate a parsed response
pub fn validate(
    response: OcspResponse,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedResponse, OcspError> {
    let signer = verify_response_signature(&response, ctx)?;
    debug!(signer = ?signer, "OCSP response signature verified");

    check_nonce(ctx.sent_nonce, response.nonce.as_deref(), ctx.nonce_required)?;

    let single = response
        .responses
        .iter()
        .find(|single| single.cert_id.matches(ctx.expected_cert_id))
        .cloned()
        .ok_or(OcspError::CertIdMismatch)?;

    check_freshness(&single, response.produced_at, ctx.now, ctx.clock_skew)?;

    Ok(ValidatedResponse {
        single,
        produced_at: response.produced_at,
        signer,
        raw_bytes: response.raw_bytes,
    })
}

/// Try every key the trust anchors allow; the first that verifies wins
fn verify_response_signature(
    response: &OcspResponse,
    ctx: &ValidationContext<'_>,
) -> Result<Signer, OcspError> {
    let message = &response.tbs_response_data;
    let responder_id = &response.responder_id;
    let mut failures = Vec::new();

    if responder_id.identifies(ctx.issuer) {
        match verify_signature(ctx.issuer, &response.signature_algorithm, message, &response.signature) {
            Ok(()) => return Ok(Signer::Issuer),
            Err(VerifyError::UnsupportedAlgorithm(msg)) => {
                return Err(OcspError::SignatureInvalid(msg))
            }
            Err(VerifyError::Failed(reason)) => failures.push(format!("issuer: {}", reason)),
        }
    } else {
        failures.push("issuer: not named by the response ResponderID".to_string());
    }

    for responder in &ctx.trust.responders {
        if !responder_id.identifies(responder) {
            failures.push(format!(
                "trusted responder {}: not named by the response ResponderID",
                responder.subject()
            ));
            continue;
        }
        match verify_signature(responder, &response.signature_algorithm, message, &response.signature) {
            Ok(()) => return Ok(Signer::TrustedResponder(responder.subject().to_string())),
            Err(e) => failures.push(format!("trusted responder {}: {}", responder.subject(), e)),
        }
    }

    if ctx.trust.allow_delegated {
        for der in &response.certs {
            let candidate = match Certificate::from_der(der) {
                Ok(cert) => cert,
                Err(e) => {
                    failures.push(format!("embedded certificate: {}", e));
                    continue;
                }
            };
            if !responder_id.identifies(&candidate) {
                failures.push(format!(
                    "embedded certificate {}: not named by the response ResponderID",
                    candidate.subject()
                ));
                continue;
            }
            if let Err(reason) = check_delegated_signer(&candidate, ctx) {
                failures.push(format!("delegated signer {}: {}", candidate.subject(), reason));
                continue;
            }
            match verify_signature(&candidate, &response.signature_algorithm, message, &response.signature) {
                Ok(()) => return Ok(Signer::Delegated(candidate.subject().to_string())),
                Err(e) => {
                    failures.push(format!("delegated signer {}: {}", candidate.subject(), e))
                }
            }
        }
    }

    Err(OcspError::SignatureInvalid(if failures.is_empty() {
        "no trusted key verifies the response".to_string()
    } else {
        failures.join("; ")
    }))
}

/// Requirements on an embedded responder certificate (RFC 6960 4.2.2.2)
fn check_delegated_signer(
    candidate: &Certificate,
    ctx: &ValidationContext<'_>,
) -> Result<(), String> {
    if !candidate.is_issued_by(ctx.issuer) {
        return Err("not issued by the certificate issuer".to_string());
    }
    if !candidate.has_ocsp_signing_eku() {
        return Err("missing id-kp-OCSPSigning extended key usage".to_string());
    }
    if !candidate.is_valid_at(ctx.now, ctx.clock_skew) {
        return Err(format!(
            "outside validity window {} .. {}",
            candidate.not_before(),
            candidate.not_after()
        ));
    }
    Ok(())
}

#[derive(Debug)]
enum VerifyError {
    UnsupportedAlgorithm(String),
    Failed(String),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::UnsupportedAlgorithm(msg) | VerifyError::Failed(msg) => f.write_str(msg),
        }
    }
}

/// Verify `signature_value` over `message` with the public key of `signer`
fn verify_signature(
    signer: &Certificate,
    algorithm_oid: &[u8],
    message: &[u8],
    signature_value: &[u8],
) -> Result<(), VerifyError> {
    let key = SpkiAlgorithm::from_spki(signer.spki_raw())
        .map_err(|e| VerifyError::Failed(format!("unreadable public key: {}", e)))?;
    let algorithm = verification_algorithm(algorithm_oid, &key)?;

    UnparsedPublicKey::new(algorithm, signer.public_key())
        .verify(message, signature_value)
        .map_err(|_| VerifyError::Failed("signature does not verify".to_string()))
}

/// Key type from a SubjectPublicKeyInfo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpkiAlgorithm {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
    Other,
}

impl SpkiAlgorithm {
    fn from_spki(spki: &[u8]) -> Result<Self, OcspError> {
        let spki = DerElement::parse_single(spki, "SubjectPublicKeyInfo")?
            .expect_tag(tag::SEQUENCE, "SubjectPublicKeyInfo")?;
        let mut alg = spki
            .reader("SubjectPublicKeyInfo")
            .expect(tag::SEQUENCE)?
            .reader("AlgorithmIdentifier");
        let oid = alg.expect(tag::OID)?.contents;

        if oid == der::oid_contents(RSA_ENCRYPTION).as_slice() {
            return Ok(Self::Rsa);
        }
        if oid == der::oid_contents(ED25519).as_slice() {
            return Ok(Self::Ed25519);
        }
        if oid == der::oid_contents(EC_PUBLIC_KEY).as_slice() {
            let curve = alg.expect(tag::OID)?.contents;
            if curve == der::oid_contents(CURVE_P256).as_slice() {
                return Ok(Self::EcP256);
            }
            if curve == der::oid_contents(CURVE_P384).as_slice() {
                return Ok(Self::EcP384);
            }
        }
        Ok(Self::Other)
    }
}

/// Map a signature algorithm OID and key type to a `ring` algorithm
fn verification_algorithm(
    algorithm_oid: &[u8],
    key: &SpkiAlgorithm,
) -> Result<&'static dyn VerificationAlgorithm, VerifyError> {
    let is = |arcs: &[u64]| der::oid_contents(arcs).as_slice() == algorithm_oid;

    let algorithm: &'static dyn VerificationAlgorithm = if is(SHA256_WITH_RSA) {
        &signature::RSA_PKCS1_2048_8192_SHA256
    } else if is(SHA384_WITH_RSA) {
        &signature::RSA_PKCS1_2048_8192_SHA384
    } else if is(SHA512_WITH_RSA) {
        &signature::RSA_PKCS1_2048_8192_SHA512
    } else if is(ECDSA_WITH_SHA256) {
        match key {
            SpkiAlgorithm::EcP384 => &signature::ECDSA_P384_SHA256_ASN1,
            _ => &signature::ECDSA_P256_SHA256_ASN1,
        }
    } else if is(ECDSA_WITH_SHA384) {
        match key {
            SpkiAlgorithm::EcP256 => &signature::ECDSA_P256_SHA384_ASN1,
            _ => &signature::ECDSA_P384_SHA384_ASN1,
        }
    } else if is(ED25519) {
        &signature::ED25519
    } else {
        return Err(VerifyError::UnsupportedAlgorithm(format!(
            "unsupported signature algorithm {}",
            oid_to_string(algorithm_oid)
        )));
    };

    let compatible = match key {
        SpkiAlgorithm::Rsa => is(SHA256_WITH_RSA) || is(SHA384_WITH_RSA) || is(SHA512_WITH_RSA),
        SpkiAlgorithm::EcP256 | SpkiAlgorithm::EcP384 => {
            is(ECDSA_WITH_SHA256) || is(ECDSA_WITH_SHA384)
        }
        SpkiAlgorithm::Ed25519 => is(ED25519),
        SpkiAlgorithm::Other => false,
    };
    if !compatible {
        return Err(VerifyError::Failed(format!(
            "key type {:?} cannot verify {}",
            key,
            oid_to_string(algorithm_oid)
        )));
    }

    Ok(algorithm)
}

/// Dotted form of OID content octets, for error messages
fn oid_to_string(contents: &[u8]) -> String {
    let mut arcs = Vec::new();
    let mut value: u64 = 0;
    for &byte in contents {
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    arcs.iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Compare the nonce echo with the nonce that was sent
pub fn check_nonce(
    sent: Option<&[u8]>,
    received: Option<&[u8]>,
    nonce_required: bool,
) -> Result<(), OcspError> {
    match (sent, received) {
        (Some(sent), Some(received)) if sent == received => Ok(()),
        (Some(_), Some(_)) => Err(OcspError::NonceMismatch),
        (Some(_), None) if nonce_required => Err(OcspError::NonceMismatch),
        (Some(_), None) => {
            warn!("OCSP responder did not echo the request nonce");
            Ok(())
        }
        (None, _) => Ok(()),
    }
}

/// Check the response timestamps against `now`, widened by `skew`
pub fn check_freshness(
    single: &SingleResponse,
    produced_at: DateTime<Utc>,
    now: DateTime<Utc>,
    skew: chrono::Duration,
) -> Result<(), OcspError> {
    if single.this_update > now + skew {
        return Err(OcspError::StaleResponse(format!(
            "thisUpdate {} is in the future (now {})",
            single.this_update, now
        )));
    }
    if let Some(next_update) = single.next_update {
        if next_update < now - skew {
            return Err(OcspError::StaleResponse(format!(
                "nextUpdate {} has passed (now {})",
                next_update, now
            )));
        }
    }
    if produced_at > now + skew {
        return Err(OcspError::StaleResponse(format!(
            "producedAt {} is in the future (now {})",
            produced_at, now
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{load, CertificateFormat};
    use crate::request::HashAlgorithm;
    use chrono::Duration;
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

    fn single(this_update: DateTime<Utc>, next_update: Option<DateTime<Utc>>) -> SingleResponse {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec![])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let cert = load(cert.der(), CertificateFormat::Der).unwrap();
        SingleResponse {
            cert_id: CertId::new(&cert, &cert, HashAlgorithm::Sha256).unwrap(),
            status: CertStatus::Good,
            this_update,
            next_update,
        }
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        let skew = Duration::seconds(300);

        let fresh = single(now - Duration::hours(1), Some(now + Duration::hours(1)));
        assert!(check_freshness(&fresh, now, now, skew).is_ok());

        let expired = single(now - Duration::days(2), Some(now - Duration::days(1)));
        assert!(matches!(
            check_freshness(&expired, now, now, skew),
            Err(OcspError::StaleResponse(_))
        ));

        let future = single(now + Duration::hours(1), None);
        assert!(matches!(
            check_freshness(&future, now, now, skew),
            Err(OcspError::StaleResponse(_))
        ));

        let no_next = single(now - Duration::days(30), None);
        assert!(check_freshness(&no_next, now, now, skew).is_ok());

        assert!(matches!(
            check_freshness(&fresh, now + Duration::hours(1), now, skew),
            Err(OcspError::StaleResponse(_))
        ));
    }

    #[test]
    fn test_freshness_skew_tolerance() {
        let now = Utc::now();
        let skew = Duration::seconds(300);

        // expired two minutes ago, inside the five minute tolerance
        let recent = single(now - Duration::hours(1), Some(now - Duration::seconds(120)));
        assert!(check_freshness(&recent, now, now, skew).is_ok());
        assert!(check_freshness(&recent, now, now, Duration::zero()).is_err());
    }

    #[test]
    fn test_nonce_checks() {
        let sent = [1u8; 32];
        let mut tampered = sent;
        tampered[5] ^= 0x01;

        assert!(check_nonce(Some(&sent), Some(&sent), true).is_ok());
        assert!(matches!(
            check_nonce(Some(&sent), Some(&tampered), false),
            Err(OcspError::NonceMismatch)
        ));
        assert!(matches!(
            check_nonce(Some(&sent), None, true),
            Err(OcspError::NonceMismatch)
        ));
        assert!(check_nonce(Some(&sent), None, false).is_ok());
        assert!(check_nonce(None, Some(&sent), true).is_ok());
    }

    #[test]
    fn test_oid_to_string() {
        assert_eq!(oid_to_string(&der::oid_contents(ECDSA_WITH_SHA256)), "1.2.840.10045.4.3.2");
        assert_eq!(oid_to_string(&der::oid_contents(ED25519)), "1.3.101.112");
    }

    #[test]
    fn test_sha1_rsa_is_unsupported() {
        let sha1_rsa = der::oid_contents(&[1, 2, 840, 113549, 1, 1, 5]);
        match verification_algorithm(&sha1_rsa, &SpkiAlgorithm::Rsa) {
            Err(VerifyError::UnsupportedAlgorithm(msg)) => {
                assert!(msg.contains("1.2.840.113549.1.1.5"))
            }
            other => panic!("expected unsupported algorithm, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_key_type_mismatch_fails() {
        let ed = der::oid_contents(ED25519);
        assert!(matches!(
            verification_algorithm(&ed, &SpkiAlgorithm::EcP256),
            Err(VerifyError::Failed(_))
        ));
    }

    #[test]
    fn test_verify_ecdsa_signature() {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let rcgen_key = rcgen::KeyPair::try_from(pkcs8.as_ref()).unwrap();
        let cert = rcgen::CertificateParams::new(vec![])
            .unwrap()
            .self_signed(&rcgen_key)
            .unwrap();
        let cert = load(cert.der(), CertificateFormat::Der).unwrap();
        assert_eq!(cert.public_key(), key_pair.public_key().as_ref());
        assert_eq!(SpkiAlgorithm::from_spki(cert.spki_raw()).unwrap(), SpkiAlgorithm::EcP256);

        let message = b"tbsResponseData";
        let sig = key_pair.sign(&rng, message).unwrap();
        let alg = der::oid_contents(ECDSA_WITH_SHA256);

        assert!(verify_signature(&cert, &alg, message, sig.as_ref()).is_ok());
        assert!(verify_signature(&cert, &alg, b"tampered", sig.as_ref()).is_err());
    }
}
