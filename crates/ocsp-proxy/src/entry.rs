//! Cache entry model and key derivation
//!
//! A cache entry is the unit stored in the shared key-value store: one hash
//! per certificate, keyed by issuer key hash and serial number. The entry
//! carries the original DER request (replayed on refresh) and the cached DER
//! response (returned to clients), plus the validity window that drives
//! freshness and re-validation decisions.

use ocsp_proto::CertStatus;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Derive the store key for a certificate.
///
/// `prefix + hex(issuerKeyHash) + "_" + hex(serialNumber)`, hex lowercase
/// without a `0x` prefix. The serial is rendered as a big-endian integer
/// with no leading-zero padding; an all-zero serial renders as `"0"`. The
/// issuer name hash is deliberately not part of the key: a responder is
/// expected to distinguish by issuer key hash plus serial within its scope,
/// so two CAs sharing an issuer key hash would collide.
pub fn cache_key(prefix: &str, issuer_key_hash: &[u8], serial_number: &[u8]) -> String {
    format!(
        "{}{}_{}",
        prefix,
        hex::encode(issuer_key_hash),
        serial_hex(serial_number)
    )
}

fn serial_hex(serial: &[u8]) -> String {
    let full = hex::encode(serial);
    let trimmed = full.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Wall clock as Unix seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A cached OCSP response with its refresh metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Store key, see [`cache_key`]
    pub cache_key: String,
    /// Upstream authority to contact on refresh, `host` or `host:port`
    pub ocsp_responder: String,
    /// Original DER OCSP request, replayed on refresh
    pub request: Vec<u8>,
    /// Cached DER OCSP response, returned to clients
    pub response: Vec<u8>,
    /// `thisUpdate` of the first SingleResponse, Unix seconds
    pub thisupd: i64,
    /// `nextUpdate` of the first SingleResponse, Unix seconds; 0 when the
    /// responder set none (such an entry is never fresh)
    pub nextupd: i64,
    /// Wall-clock time of the last successful upstream fetch
    pub lastchecked: i64,
    /// Certificate status the responder reported
    pub status: CertStatus,
    /// Nonce extensions seen in the upstream response; entries with a
    /// non-zero count must never be persisted
    pub nonce: u32,
}

/// A stored hash field failed to decode
#[derive(Debug, Error)]
#[error("field {field}: {reason}")]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl CacheEntry {
    /// Whether this entry may be served without an upstream round-trip.
    ///
    /// `nextupd == now` is already stale.
    pub fn is_fresh(&self, now: i64) -> bool {
        self.nextupd > now
            && self.thisupd > 0
            && !self.request.is_empty()
            && !self.response.is_empty()
    }

    /// Whether the entry can still be refreshed: the refresher needs the
    /// upstream authority and the original request to replay.
    pub fn is_refreshable(&self) -> bool {
        !self.ocsp_responder.is_empty() && !self.request.is_empty()
    }

    /// The entry as store hash fields. Byte fields are stored raw, numbers
    /// as decimal strings, the status as its tag name.
    pub fn to_fields(&self) -> Vec<(&'static str, Vec<u8>)> {
        vec![
            ("ocsp_responder", self.ocsp_responder.clone().into_bytes()),
            ("request", self.request.clone()),
            ("response", self.response.clone()),
            ("thisupd", self.thisupd.to_string().into_bytes()),
            ("nextupd", self.nextupd.to_string().into_bytes()),
            ("lastchecked", self.lastchecked.to_string().into_bytes()),
            ("status", self.status.as_str().as_bytes().to_vec()),
            ("nonce", self.nonce.to_string().into_bytes()),
        ]
    }

    /// Rebuild an entry from store hash fields.
    ///
    /// Missing fields decode to empty/zero defaults so that incomplete
    /// entries surface through [`CacheEntry::is_fresh`] and
    /// [`CacheEntry::is_refreshable`] instead of failing the read; a field
    /// that is present but not decodable is an error.
    pub fn from_fields(
        cache_key: impl Into<String>,
        mut fields: HashMap<String, Vec<u8>>,
    ) -> Result<Self, FieldError> {
        let ocsp_responder = match fields.remove("ocsp_responder") {
            Some(raw) => String::from_utf8(raw).map_err(|e| FieldError {
                field: "ocsp_responder",
                reason: e.to_string(),
            })?,
            None => String::new(),
        };
        let status = match fields.remove("status") {
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(CertStatus::parse)
                .unwrap_or(CertStatus::Unknown),
            None => CertStatus::Unknown,
        };

        Ok(Self {
            cache_key: cache_key.into(),
            ocsp_responder,
            request: fields.remove("request").unwrap_or_default(),
            response: fields.remove("response").unwrap_or_default(),
            thisupd: int_field(&mut fields, "thisupd")?,
            nextupd: int_field(&mut fields, "nextupd")?,
            lastchecked: int_field(&mut fields, "lastchecked")?,
            status,
            nonce: int_field(&mut fields, "nonce")? as u32,
        })
    }
}

fn int_field(fields: &mut HashMap<String, Vec<u8>>, field: &'static str) -> Result<i64, FieldError> {
    match fields.remove(field) {
        None => Ok(0),
        Some(raw) => std::str::from_utf8(&raw)
            .map_err(|e| FieldError {
                field,
                reason: e.to_string(),
            })?
            .parse()
            .map_err(|e: std::num::ParseIntError| FieldError {
                field,
                reason: e.to_string(),
            }),
    }
}
