//! OCSP Protocol Decoding
//!
//! This crate decodes OCSP (RFC 6960) requests and responses just far enough
//! to drive a caching proxy: which certificate a request asks about, how many
//! certificates it asks about, what a responder answered, how long that
//! answer is valid, and whether the answer is bound to a nonce.
//!
//! Signature verification is intentionally out of scope; the proxy trusts
//! its upstream responders.
//!
//! # Example
//!
//! ```no_run
//! use ocsp_proto::{decode_request, decode_response};
//!
//! # fn example(request_der: &[u8], response_der: &[u8]) -> Result<(), ocsp_proto::CodecError> {
//! let request = decode_request(request_der)?;
//! println!("certificates in request: {}", request.request_count);
//!
//! let response = decode_response(response_der)?;
//! if response.is_successful() {
//!     println!("nonce extensions: {}", response.nonce_count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;

pub use codec::{
    decode_request, decode_response, CertStatus, CodecError, DecodedRequest, DecodedResponse,
    ResponseStatus, SingleStatus,
};
