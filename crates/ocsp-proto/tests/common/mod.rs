//! Shared fixtures for OCSP integration tests
//!
//! Builds a small PKI with rcgen (CA, leaf, delegated responders), and a
//! wiremock responder that decodes incoming requests and answers with
//! ring-signed OCSP responses.

#![allow(dead_code)]

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use ocsp_proto::der::{self, tag, DerElement};
use ocsp_proto::request::NONCE_OID;
use ocsp_proto::response::BASIC_RESPONSE_OID;
use ocsp_proto::{CertId, CertStatus, Certificate, CertificateFormat, HashAlgorithm};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, ECDSA_P256_SHA256_ASN1_SIGNING,
};
use sha1::{Digest, Sha1};
use wiremock::{Request, Respond, ResponseTemplate};

const ECDSA_WITH_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
const ED25519: &[u64] = &[1, 3, 101, 112];
const AIA_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];
const OCSP_ACCESS_METHOD: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1];

/// Signing key usable by both rcgen (certificates) and ring (responses)
#[derive(Clone)]
pub enum TestKey {
    EcdsaP256(Vec<u8>),
    Ed25519(Vec<u8>),
}

impl TestKey {
    pub fn ecdsa() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        TestKey::EcdsaP256(pkcs8.as_ref().to_vec())
    }

    pub fn ed25519() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        TestKey::Ed25519(pkcs8.as_ref().to_vec())
    }

    pub fn rcgen_key(&self) -> KeyPair {
        let pkcs8 = match self {
            TestKey::EcdsaP256(pkcs8) | TestKey::Ed25519(pkcs8) => pkcs8,
        };
        KeyPair::try_from(pkcs8.as_slice()).unwrap()
    }

    pub fn public_key(&self) -> Vec<u8> {
        let rng = SystemRandom::new();
        match self {
            TestKey::EcdsaP256(pkcs8) => {
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
                    .unwrap()
                    .public_key()
                    .as_ref()
                    .to_vec()
            }
            TestKey::Ed25519(pkcs8) => Ed25519KeyPair::from_pkcs8(pkcs8)
                .unwrap()
                .public_key()
                .as_ref()
                .to_vec(),
        }
    }

    pub fn algorithm_identifier(&self) -> Vec<u8> {
        match self {
            TestKey::EcdsaP256(_) => der::sequence(&der::oid(ECDSA_WITH_SHA256)),
            TestKey::Ed25519(_) => der::sequence(&der::oid(ED25519)),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        match self {
            TestKey::EcdsaP256(pkcs8) => {
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
                    .unwrap()
                    .sign(&rng, message)
                    .unwrap()
                    .as_ref()
                    .to_vec()
            }
            TestKey::Ed25519(pkcs8) => Ed25519KeyPair::from_pkcs8(pkcs8)
                .unwrap()
                .sign(message)
                .as_ref()
                .to_vec(),
        }
    }
}

/// A certificate together with the key that owns it
pub struct Identity {
    pub key: TestKey,
    pub cert: rcgen::Certificate,
}

impl Identity {
    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn certificate(&self) -> Certificate {
        ocsp_proto::load(self.cert.der(), CertificateFormat::Der).unwrap()
    }
}

/// CA, leaf and a few candidate responders
pub struct TestPki {
    pub ca: Identity,
    pub leaf: Identity,
}

impl TestPki {
    pub fn new() -> Self {
        Self::with_ca_key(TestKey::ecdsa())
    }

    pub fn with_ca_key(ca_key: TestKey) -> Self {
        let mut ca_params = CertificateParams::new(vec![]).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Test OCSP Root CA");
        let ca_cert = ca_params.self_signed(&ca_key.rcgen_key()).unwrap();
        let ca = Identity {
            key: ca_key,
            cert: ca_cert,
        };

        let leaf = issue(&ca, "leaf.example.com", false, Some("http://ocsp.example.com/"));
        Self { ca, leaf }
    }

    /// Responder certificate issued by the CA, optionally with OCSPSigning EKU
    pub fn delegated_responder(&self, with_eku: bool) -> Identity {
        issue(&self.ca, "Test OCSP Responder", with_eku, None)
    }

    /// Self-signed responder unrelated to the CA
    pub fn unrelated_responder(&self) -> Identity {
        let key = TestKey::ecdsa();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, "Unrelated Responder");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
        let cert = params.self_signed(&key.rcgen_key()).unwrap();
        Identity { key, cert }
    }

    pub fn cert_id(&self, hash: HashAlgorithm) -> CertId {
        CertId::new(&self.leaf.certificate(), &self.ca.certificate(), hash).unwrap()
    }
}

fn issue(issuer: &Identity, cn: &str, ocsp_signing: bool, ocsp_url: Option<&str>) -> Identity {
    let key = TestKey::ecdsa();
    let mut params = CertificateParams::new(vec![cn.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.serial_number = Some(rcgen::SerialNumber::from_slice(&[0x0A, 0x1B, 0x2C, 0x3D]));
    if ocsp_signing {
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
    }
    if let Some(url) = ocsp_url {
        params.custom_extensions.push(aia_extension(url));
    }
    let cert = params
        .signed_by(&key.rcgen_key(), &issuer.cert, &issuer.key.rcgen_key())
        .unwrap();
    Identity { key, cert }
}

/// AuthorityInfoAccess with a single id-ad-ocsp URI
fn aia_extension(url: &str) -> CustomExtension {
    let mut access = der::oid(OCSP_ACCESS_METHOD);
    // GeneralName uniformResourceIdentifier [6] IMPLICIT IA5String
    access.extend_from_slice(&der::tlv(0x86, url.as_bytes()));
    let value = der::sequence(&der::sequence(&access));
    CustomExtension::from_oid_content(AIA_OID, value)
}

/// How the responder treats the request nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceEcho {
    Echo,
    Tamper,
    Omit,
}

/// Everything that goes into one signed response
#[derive(Clone)]
pub struct ResponseSpec {
    pub signer: TestKey,
    /// Key the responderID names, when it is not the signer's
    pub named_key: Option<TestKey>,
    pub certs: Vec<Vec<u8>>,
    pub status: CertStatus,
    pub produced_at: DateTime<Utc>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

impl ResponseSpec {
    pub fn good(signer: &TestKey) -> Self {
        let now = Utc::now();
        Self {
            signer: signer.clone(),
            named_key: None,
            certs: Vec::new(),
            status: CertStatus::Good,
            produced_at: now - Duration::minutes(1),
            this_update: now - Duration::hours(1),
            next_update: Some(now + Duration::hours(23)),
        }
    }

    pub fn with_status(mut self, status: CertStatus) -> Self {
        self.status = status;
        self
    }

    pub fn naming(mut self, key: &TestKey) -> Self {
        self.named_key = Some(key.clone());
        self
    }

    pub fn embedding(mut self, cert_der: Vec<u8>) -> Self {
        self.certs.push(cert_der);
        self
    }

    /// DER OCSPResponse for `cert_id`, echoing `nonce` if given
    pub fn encode(&self, cert_id: &CertId, nonce: Option<&[u8]>) -> Vec<u8> {
        let mut single = cert_id.to_der();
        single.extend_from_slice(&encode_status(&self.status));
        single.extend_from_slice(&der::generalized_time(&self.this_update));
        if let Some(next_update) = &self.next_update {
            single.extend_from_slice(&der::explicit(0, &der::generalized_time(next_update)));
        }
        let single = der::sequence(&single);

        // responderID byKey
        let named = self.named_key.as_ref().unwrap_or(&self.signer);
        let key_hash = Sha1::digest(named.public_key());
        let mut data = der::explicit(2, &der::octet_string(&key_hash));
        data.extend_from_slice(&der::generalized_time(&self.produced_at));
        data.extend_from_slice(&der::sequence(&single));
        if let Some(nonce) = nonce {
            let mut ext = der::oid(NONCE_OID);
            ext.extend_from_slice(&der::octet_string(&der::octet_string(nonce)));
            data.extend_from_slice(&der::explicit(1, &der::sequence(&der::sequence(&ext))));
        }
        let tbs = der::sequence(&data);

        let mut basic = tbs.clone();
        basic.extend_from_slice(&self.signer.algorithm_identifier());
        basic.extend_from_slice(&der::bit_string(&self.signer.sign(&tbs)));
        if !self.certs.is_empty() {
            basic.extend_from_slice(&der::explicit(0, &der::sequence(&self.certs.concat())));
        }
        let basic = der::sequence(&basic);

        let mut response_bytes = der::oid(BASIC_RESPONSE_OID);
        response_bytes.extend_from_slice(&der::octet_string(&basic));

        let mut outer = der::enumerated(0);
        outer.extend_from_slice(&der::explicit(0, &der::sequence(&response_bytes)));
        der::sequence(&outer)
    }
}

fn encode_status(status: &CertStatus) -> Vec<u8> {
    match status {
        CertStatus::Good => vec![0x80, 0x00],
        CertStatus::Revoked {
            revocation_time,
            reason,
        } => {
            let mut info = der::generalized_time(revocation_time);
            if let Some(reason) = reason {
                info.extend_from_slice(&der::explicit(0, &der::enumerated(reason.code())));
            }
            der::tlv(tag::context(1), &info)
        }
        CertStatus::Unknown => vec![0x82, 0x00],
    }
}

/// Error-status OCSPResponse (no responseBytes)
pub fn error_response(code: u8) -> Vec<u8> {
    der::sequence(&der::enumerated(code))
}

/// Request fields the responder cares about
pub struct DecodedRequest {
    pub cert_id: CertId,
    pub nonce: Option<Vec<u8>>,
}

/// Decode an OCSPRequest from the test side
pub fn decode_request(bytes: &[u8]) -> DecodedRequest {
    let outer = DerElement::parse_single(bytes, "OCSPRequest").unwrap();
    let tbs = outer.reader("OCSPRequest").expect(tag::SEQUENCE).unwrap();
    let mut tbs_fields = tbs.reader("TBSRequest");
    let request_list = tbs_fields.expect(tag::SEQUENCE).unwrap();
    let request = request_list.reader("requestList").expect(tag::SEQUENCE).unwrap();
    let cert_id =
        CertId::from_der_element(request.reader("Request").next_element().unwrap()).unwrap();

    let mut nonce = None;
    if let Some(exts) = tbs_fields.optional(tag::context(2)).unwrap() {
        let list = exts.reader("exts").expect(tag::SEQUENCE).unwrap();
        for ext in list.reader("exts") {
            let mut fields = ext.unwrap().reader("ext");
            let oid = fields.expect(tag::OID).unwrap();
            let value = fields.expect(tag::OCTET_STRING).unwrap();
            if oid.contents == der::oid_contents(NONCE_OID).as_slice() {
                let inner = DerElement::parse_single(value.contents, "nonce").unwrap();
                nonce = Some(inner.contents.to_vec());
            }
        }
    }

    DecodedRequest { cert_id, nonce }
}

/// wiremock responder that answers each request with a signed response
#[derive(Clone)]
pub struct OcspResponder {
    pub spec: ResponseSpec,
    pub nonce: NonceEcho,
    /// Answer for this CertID instead of the requested one
    pub cert_id_override: Option<CertId>,
}

impl OcspResponder {
    pub fn new(spec: ResponseSpec) -> Self {
        Self {
            spec,
            nonce: NonceEcho::Echo,
            cert_id_override: None,
        }
    }

    pub fn nonce(mut self, nonce: NonceEcho) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn answering_for(mut self, cert_id: CertId) -> Self {
        self.cert_id_override = Some(cert_id);
        self
    }
}

impl Respond for OcspResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let der = if request.body.is_empty() {
            // GET: the request is the last path segment
            let segment = request.url.path().trim_start_matches('/');
            let decoded = urlencoding::decode(segment).unwrap();
            BASE64_STANDARD.decode(decoded.as_bytes()).unwrap()
        } else {
            request.body.clone()
        };
        let decoded = decode_request(&der);

        let nonce = match (self.nonce, decoded.nonce) {
            (NonceEcho::Echo, nonce) => nonce,
            (NonceEcho::Tamper, Some(mut nonce)) => {
                nonce[0] ^= 0xFF;
                Some(nonce)
            }
            (NonceEcho::Tamper, None) | (NonceEcho::Omit, _) => None,
        };

        let cert_id = self.cert_id_override.clone().unwrap_or(decoded.cert_id);
        let body = self.spec.encode(&cert_id, nonce.as_deref());

        ResponseTemplate::new(200)
            .insert_header("content-type", "application/ocsp-response")
            .set_body_bytes(body)
    }
}
