//! Upstream OCSP fetching
//!
//! One pooled HTTP client serves every handler task and the refresher.
//! Responders are plain-HTTP by protocol design (the responses are signed);
//! the proxy never speaks TLS upstream.

use bytes::Bytes;
use ocsp_proto::{CodecError, ResponseStatus, SingleStatus};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::UpstreamConfig;

/// Content type of an OCSP request body
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
/// Content type of an OCSP response body
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

const USER_AGENT: &str = "ocsp_proxy";

/// Errors from the HTTP leg of an upstream fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection or I/O failure, including timeouts
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-200 status
    #[error("upstream returned HTTP status {0}")]
    Status(u16),

    /// Upstream answered 200 but not with an OCSP response body
    #[error("upstream returned content type {0:?}")]
    ContentType(String),

    /// The shared HTTP client could not be built
    #[error("cannot build HTTP client: {0}")]
    Client(String),
}

/// A fetched upstream response that passed framing, decoding, and
/// responder-status validation
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// The raw DER response body, byte-for-byte as received
    pub raw: Vec<u8>,
    /// Validity window and status of the first SingleResponse
    pub single: SingleStatus,
    /// Nonce extensions present in the response
    pub nonce_count: usize,
}

/// Errors from a validated fetch: HTTP, decode, or responder status
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] CodecError),

    /// The responder answered, but not with `successful (0)`
    #[error("responder status {0:?}")]
    ResponderStatus(ResponseStatus),
}

/// HTTP client for upstream OCSP responders
#[derive(Debug, Clone)]
pub struct OcspFetcher {
    client: reqwest::Client,
}

impl OcspFetcher {
    /// Build the shared client with the configured timeout
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// POST an OCSP request to `http://<responder>/` and return the response
    /// body unchanged.
    ///
    /// Validates the framing only: status must be 200 and the reply content
    /// type must be `application/ocsp-response`.
    pub async fn fetch(&self, responder: &str, request: &[u8]) -> Result<Vec<u8>, FetchError> {
        let response = self.post(responder, request).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type != OCSP_RESPONSE_CONTENT_TYPE {
            return Err(FetchError::ContentType(content_type));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }

    /// Fetch and fully validate: HTTP framing, DER decode, responder status.
    ///
    /// This is the shared miss-path/refresh primitive; the caller decides
    /// whether the result may be persisted (`nonce_count == 0`).
    pub async fn fetch_validated(
        &self,
        responder: &str,
        request: &[u8],
    ) -> Result<FetchedResponse, UpstreamError> {
        let raw = self.fetch(responder, request).await?;
        let decoded = ocsp_proto::decode_response(&raw)?;

        if !decoded.is_successful() {
            return Err(UpstreamError::ResponderStatus(decoded.status));
        }
        let single = decoded
            .single
            .ok_or(UpstreamError::Decode(CodecError::EmptyResponseList))?;

        Ok(FetchedResponse {
            raw,
            single,
            nonce_count: decoded.nonce_count,
        })
    }

    /// Round-trip for the multi-request bypass: POST the raw request and
    /// hand back status, headers, and body with no validation at all.
    pub async fn forward(
        &self,
        responder: &str,
        request: &[u8],
    ) -> Result<(StatusCode, HeaderMap, Bytes), FetchError> {
        let response = self.post(responder, request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok((status, headers, body))
    }

    async fn post(
        &self,
        responder: &str,
        request: &[u8],
    ) -> Result<reqwest::Response, FetchError> {
        let url = format!("http://{}/", responder);

        self.client
            .post(&url)
            .header(CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE)
            .body(request.to_vec())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let fetcher = OcspFetcher::new(&UpstreamConfig::default()).unwrap();

        // TCP port 1 refuses connections
        let err = fetcher.fetch("127.0.0.1:1", &[0x30, 0x00]).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
