//! OCSP request/response decoding (RFC 6960)
//!
//! The decoder is schema-typed via the `x509-ocsp` crate and deliberately
//! lenient: unknown extensions are ignored and optional fields decode to
//! absent. Only the fields a caching proxy needs are surfaced.
//!
//! ## ASN.1 structures (RFC 6960)
//!
//! ```asn1
//! OCSPRequest ::= SEQUENCE {
//!     tbsRequest          TBSRequest,
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
//! SingleResponse ::= SEQUENCE {
//!     certID              CertID,
//!     certStatus          CertStatus,
//!     thisUpdate          GeneralizedTime,
//!     nextUpdate          [0] EXPLICIT GeneralizedTime OPTIONAL,
//!     singleExtensions    [1] EXPLICIT Extensions OPTIONAL
//! }
//! ```
//!
//! The response is decoded in two stages, mirroring the wire format:
//! `OCSPResponse` first, then `responseBytes.response` as
//! `BasicOCSPResponse`.

use const_oid::db::rfc6960::{ID_PKIX_OCSP_BASIC, ID_PKIX_OCSP_NONCE};
use const_oid::ObjectIdentifier;
use der::Decode;
use std::fmt;
use x509_ocsp::{
    BasicOcspResponse, CertStatus as Rfc6960CertStatus, OcspGeneralizedTime, OcspRequest,
    OcspResponse,
};

/// OCSP response status (RFC 6960 Section 4.2.1); `Successful` is 0.
pub use x509_ocsp::OcspResponseStatus as ResponseStatus;

/// Errors raised while decoding OCSP structures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The request is not valid DER or not a valid OCSPRequest
    #[error("malformed OCSP request: {0}")]
    MalformedRequest(der::Error),

    /// The response is not valid DER or not a valid OCSPResponse
    #[error("malformed OCSP response: {0}")]
    MalformedResponse(der::Error),

    /// The request carries an empty requestList
    #[error("OCSP request list is empty")]
    EmptyRequestList,

    /// A successful response carried no responseBytes
    #[error("successful OCSP response without response bytes")]
    MissingResponseBytes,

    /// responseBytes is not a BasicOCSPResponse
    #[error("unsupported OCSP response type: {0}")]
    UnsupportedResponseType(ObjectIdentifier),

    /// The response data carries an empty response list
    #[error("OCSP response carries no single responses")]
    EmptyResponseList,
}

/// Certificate status reported by a responder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    /// Certificate is not revoked
    Good,
    /// Certificate has been revoked
    Revoked,
    /// Responder does not know the certificate
    Unknown,
}

impl CertStatus {
    /// The lowercase tag name, as persisted in the cache store
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Good => "good",
            CertStatus::Revoked => "revoked",
            CertStatus::Unknown => "unknown",
        }
    }

    /// Parse the persisted tag name back into a status
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "good" => Some(CertStatus::Good),
            "revoked" => Some(CertStatus::Revoked),
            "unknown" => Some(CertStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caching-relevant content of an OCSP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    /// Number of entries in the requestList
    pub request_count: usize,
    /// issuerKeyHash of the first reqCert
    pub issuer_key_hash: Vec<u8>,
    /// serialNumber of the first reqCert, big-endian content bytes
    pub serial_number: Vec<u8>,
}

/// Validity window and status from the first SingleResponse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleStatus {
    /// thisUpdate as Unix seconds
    pub this_update: i64,
    /// nextUpdate as Unix seconds, if the responder set one
    pub next_update: Option<i64>,
    /// The certStatus CHOICE tag
    pub cert_status: CertStatus,
}

/// The caching-relevant content of an OCSP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Top-level responseStatus
    pub status: ResponseStatus,
    /// First SingleResponse; `None` when the response is not successful
    pub single: Option<SingleStatus>,
    /// Occurrences of the nonce extension (OID 1.3.6.1.5.5.7.48.1.2)
    /// across tbsResponseData.responseExtensions
    pub nonce_count: usize,
}

impl DecodedResponse {
    /// True iff responseStatus is `successful (0)`
    pub fn is_successful(&self) -> bool {
        self.status == ResponseStatus::Successful
    }
}

/// Decode an OCSP request far enough to identify the queried certificate.
///
/// Returns the length of the requestList and the issuer key hash and serial
/// number of the first entry. Multi-certificate requests decode fine; the
/// caller decides what to do with `request_count > 1`.
pub fn decode_request(raw: &[u8]) -> Result<DecodedRequest, CodecError> {
    let req = OcspRequest::from_der(raw).map_err(CodecError::MalformedRequest)?;
    let request_list = &req.tbs_request.request_list;
    let first = request_list.first().ok_or(CodecError::EmptyRequestList)?;

    Ok(DecodedRequest {
        request_count: request_list.len(),
        issuer_key_hash: first.req_cert.issuer_key_hash.as_bytes().to_vec(),
        serial_number: first.req_cert.serial_number.as_bytes().to_vec(),
    })
}

/// Decode an OCSP response far enough to make a caching decision.
///
/// A non-successful responseStatus is not an error here: the result carries
/// the status with no single-response data. A successful response must carry
/// a BasicOCSPResponse with at least one SingleResponse; only the first one
/// is inspected.
pub fn decode_response(raw: &[u8]) -> Result<DecodedResponse, CodecError> {
    let resp = OcspResponse::from_der(raw).map_err(CodecError::MalformedResponse)?;

    if resp.response_status != ResponseStatus::Successful {
        return Ok(DecodedResponse {
            status: resp.response_status,
            single: None,
            nonce_count: 0,
        });
    }

    let response_bytes = resp
        .response_bytes
        .as_ref()
        .ok_or(CodecError::MissingResponseBytes)?;
    if response_bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(CodecError::UnsupportedResponseType(
            response_bytes.response_type,
        ));
    }

    let basic = BasicOcspResponse::from_der(response_bytes.response.as_bytes())
        .map_err(CodecError::MalformedResponse)?;
    let tbs = &basic.tbs_response_data;

    let nonce_count = tbs
        .response_extensions
        .iter()
        .flatten()
        .filter(|ext| ext.extn_id == ID_PKIX_OCSP_NONCE)
        .count();

    let first = tbs.responses.first().ok_or(CodecError::EmptyResponseList)?;
    let cert_status = match &first.cert_status {
        Rfc6960CertStatus::Good(_) => CertStatus::Good,
        Rfc6960CertStatus::Revoked(_) => CertStatus::Revoked,
        Rfc6960CertStatus::Unknown(_) => CertStatus::Unknown,
    };

    Ok(DecodedResponse {
        status: resp.response_status,
        single: Some(SingleStatus {
            this_update: unix_seconds(&first.this_update),
            next_update: first.next_update.as_ref().map(unix_seconds),
            cert_status,
        }),
        nonce_count,
    })
}

fn unix_seconds(t: &OcspGeneralizedTime) -> i64 {
    t.0.to_unix_duration().as_secs() as i64
}
