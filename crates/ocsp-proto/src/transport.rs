//! OCSP over HTTP (RFC 6960 Appendix A)
//!
//! Requests go out as POST bodies with `application/ocsp-request`. Small
//! requests can go out as GET, with the base64 request percent-encoded into
//! the path, when the caller opts in.
//!
//! The GET path uses the standard base64 alphabet, then percent-encodes
//! `+`, `/` and `=`, as RFC 6960 Appendix A.1 specifies. It is not the
//! base64url alphabet: responders decode the path segment as standard
//! base64 after URL-decoding it.
//!
//! One call is one exchange: no retries, and idle connections are not kept
//! between calls. The timeout covers connect, send and the full body read.
//! Dropping the returned future aborts the request.

use crate::config::OcspConfig;
use crate::error::OcspError;
use base64::prelude::*;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, warn};

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// GET is only used when the full request URL stays under this length
pub const MAX_GET_URL_LEN: usize = 255;

/// HTTP transport for OCSP requests
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    use_get_for_small_requests: bool,
    max_response_size: usize,
}

impl HttpTransport {
    /// Create a transport from client configuration
    pub fn new(config: &OcspConfig) -> Result<Self, OcspError> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .user_agent(concat!("ocsp-proto/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OcspError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            use_get_for_small_requests: config.use_get_for_small_requests,
            max_response_size: config.max_response_size_bytes,
        })
    }

    /// Send a DER-encoded request and return the response body
    pub async fn send(
        &self,
        url: &str,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, OcspError> {
        let url = parse_responder_url(url)?;

        match tokio::time::timeout(timeout, self.exchange(url, request)).await {
            Ok(result) => result,
            Err(_) => Err(OcspError::Timeout(timeout)),
        }
    }

    async fn exchange(&self, url: Url, request: &[u8]) -> Result<Vec<u8>, OcspError> {
        let get_url = if self.use_get_for_small_requests {
            get_request_url(&url, request).filter(|u| u.len() < MAX_GET_URL_LEN)
        } else {
            None
        };

        let builder = match get_url {
            Some(get_url) => {
                debug!(url = %get_url, "Sending OCSP GET request");
                self.http_client.get(get_url)
            }
            None => {
                debug!(url = %url, size = request.len(), "Sending OCSP POST request");
                self.http_client
                    .post(url)
                    .header(CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE)
                    .body(request.to_vec())
            }
        };

        let mut response = builder
            .header(ACCEPT, OCSP_RESPONSE_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| OcspError::transport(format!("OCSP HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OcspError::http_status(status.as_u16()));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.starts_with(OCSP_RESPONSE_CONTENT_TYPE) {
                warn!(
                    content_type = %content_type,
                    "Unexpected Content-Type from OCSP responder"
                );
            }
        }

        if let Some(length) = response.content_length() {
            if length > self.max_response_size as u64 {
                return Err(self.too_large(length as usize));
            }
        }

        // Read response body with size limit
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            OcspError::transport(format!("Failed to read OCSP response body: {}", e))
        })? {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(self.too_large(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(size = body.len(), "Received OCSP response");
        Ok(body)
    }

    fn too_large(&self, size: usize) -> OcspError {
        OcspError::transport(format!(
            "OCSP response too large: {} bytes (max: {})",
            size, self.max_response_size
        ))
    }
}

/// Parse a responder URL, accepting only http and https
pub fn parse_responder_url(url: &str) -> Result<Url, OcspError> {
    let parsed = Url::parse(url)
        .map_err(|e| OcspError::transport(format!("Invalid responder URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(OcspError::transport(format!(
            "Unsupported responder URL scheme '{}'",
            other
        ))),
    }
}

/// `{url}/{url-encoded base64 of the DER request}`
pub fn get_request_url(url: &Url, request: &[u8]) -> Option<String> {
    if url.query().is_some() || url.fragment().is_some() {
        return None;
    }
    let encoded = urlencoding::encode(&BASE64_STANDARD.encode(request)).into_owned();
    let base = url.as_str().trim_end_matches('/');
    Some(format!("{}/{}", base, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(use_get: bool) -> HttpTransport {
        HttpTransport::new(&OcspConfig {
            use_get_for_small_requests: use_get,
            max_response_size_bytes: 1024,
            ..OcspConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_scheme_is_checked() {
        assert!(parse_responder_url("http://ocsp.example.com").is_ok());
        assert!(parse_responder_url("https://ocsp.example.com/ocsp").is_ok());
        assert!(matches!(
            parse_responder_url("ftp://ocsp.example.com"),
            Err(OcspError::Transport {
                status_code: None,
                ..
            })
        ));
        assert!(parse_responder_url("not a url").is_err());
    }

    #[test]
    fn test_get_url_encoding() {
        let url = Url::parse("http://ocsp.example.com/").unwrap();
        // 0xFB 0xFF encodes to "+/8=", all of which need escaping
        let get = get_request_url(&url, &[0xFB, 0xFF]).unwrap();
        assert_eq!(get, "http://ocsp.example.com/%2B%2F8%3D");

        let url = Url::parse("http://ocsp.example.com/ocsp").unwrap();
        assert_eq!(
            get_request_url(&url, &[0x30, 0x00]).unwrap(),
            "http://ocsp.example.com/ocsp/MAA%3D"
        );

        let with_query = Url::parse("http://ocsp.example.com/?a=b").unwrap();
        assert!(get_request_url(&with_query, &[0x30, 0x00]).is_none());
    }

    #[tokio::test]
    async fn test_post_sends_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", OCSP_REQUEST_CONTENT_TYPE))
            .and(header("accept", OCSP_RESPONSE_CONTENT_TYPE))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", OCSP_RESPONSE_CONTENT_TYPE)
                    .set_body_bytes(vec![0x30, 0x03, 0x0A, 0x01, 0x03]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = transport(false)
            .send(&server.uri(), &[0x30, 0x00], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, vec![0x30, 0x03, 0x0A, 0x01, 0x03]);
    }

    #[tokio::test]
    async fn test_small_request_uses_get_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x30, 0x00]))
            .expect(1)
            .mount(&server)
            .await;

        transport(true)
            .send(&server.uri(), &[0x30, 0x00], Duration::from_secs(5))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/MAA%3D");
    }

    #[tokio::test]
    async fn test_large_request_falls_back_to_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x30, 0x00]))
            .expect(1)
            .mount(&server)
            .await;

        transport(true)
            .send(&server.uri(), &[0xAA; 300], Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(false)
            .send(&server.uri(), &[0x30, 0x00], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OcspError::Transport {
                status_code: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let err = transport(false)
            .send(&server.uri(), &[0x30, 0x00], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_bytes(vec![0x30, 0x00]),
            )
            .mount(&server)
            .await;

        let body = transport(false)
            .send(&server.uri(), &[0x30, 0x00], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, vec![0x30, 0x00]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop a listener to get a port with nothing behind it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = transport(false)
            .send(
                &format!("http://127.0.0.1:{}/", port),
                &[0x30, 0x00],
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
