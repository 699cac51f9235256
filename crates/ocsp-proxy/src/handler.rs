//! OCSP request handling
//!
//! Every accepted request lands in [`handle`], regardless of method or path;
//! hyper drives the per-connection keep-alive loop above it. The handler
//! classifies the request (purge, multi-request bypass, cache hit, miss),
//! reads the store directly, and routes every mutation through the write
//! serializer. A handler failure is always local to its own response.

use crate::config::ProxyConfig;
use crate::entry::{cache_key, unix_now, CacheEntry};
use crate::fetch::{OcspFetcher, OCSP_REQUEST_CONTENT_TYPE, OCSP_RESPONSE_CONTENT_TYPE};
use crate::store::{CacheStore, StoreError};
use crate::writer::CacheWriter;
use axum::body::{to_bytes, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{
    HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, DATE, EXPIRES, HOST, LAST_MODIFIED,
};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::DateTime;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Requests carrying this header purge the addressed entry instead of
/// querying it
pub const PRUNE_HEADER: &str = "x-prune-from-cache";

/// Upper bound on client request bodies; OCSP requests are tiny
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Shared context handed to every handler task
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub store: Arc<dyn CacheStore>,
    pub writer: CacheWriter,
    pub fetcher: Arc<OcspFetcher>,
}

/// Handle one client request
pub async fn handle(
    State(state): State<ProxyState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    // Only OCSP POSTs are served
    if parts.method != Method::POST {
        return reply_error(StatusCode::FORBIDDEN, "only OCSP POST is served");
    }

    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let prune = parts.headers.contains_key(PRUNE_HEADER);

    if host.is_none() && !prune {
        return reply_error(StatusCode::BAD_REQUEST, "'Host' missing");
    }

    if let Some(forwarded) = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        debug!(client = %peer, x_forwarded_for = %forwarded, "request was forwarded");
    }

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != OCSP_REQUEST_CONTENT_TYPE {
        return reply_error(
            StatusCode::BAD_REQUEST,
            "'application/ocsp-request' required",
        );
    }

    let body = match to_bytes(body, MAX_REQUEST_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(client = %peer, error = %e, "unreadable request body");
            return reply_error(StatusCode::BAD_REQUEST, "unreadable request body");
        }
    };

    let decoded = match ocsp_proto::decode_request(&body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(client = %peer, error = %e, "cannot parse ocsp request");
            return reply_error(StatusCode::BAD_REQUEST, "cannot parse ocsp request");
        }
    };

    // Multi-certificate requests bypass the cache entirely
    if decoded.request_count > 1 {
        return match host {
            Some(host) => bypass(&state, peer, &host, &body).await,
            None => reply_error(StatusCode::BAD_REQUEST, "'Host' missing"),
        };
    }

    let key = cache_key(
        &state.config.store.key_prefix,
        &decoded.issuer_key_hash,
        &decoded.serial_number,
    );

    if prune {
        state.writer.delete(key.clone());
        info!(client = %peer, cache_key = %key, "cache entry pruned");
        return reply_error(StatusCode::GONE, "cache cleared");
    }

    let Some(host) = host else {
        return reply_error(StatusCode::BAD_REQUEST, "'Host' missing");
    };

    match state.store.get(&key).await {
        Ok(Some(entry)) if entry.is_fresh(unix_now()) => {
            info!(
                client = %peer,
                cache_key = %key,
                disposition = "cached",
                "request served"
            );
            return serve(&entry);
        }
        Ok(_) => {}
        Err(StoreError::Unavailable(e)) => {
            error!(client = %peer, cache_key = %key, error = %e, "cache store unavailable");
            return reply_error(StatusCode::SERVICE_UNAVAILABLE, "cache store unavailable");
        }
        Err(e @ StoreError::Corrupt { .. }) => {
            // A fresh fetch will overwrite whatever is stored there
            warn!(client = %peer, error = %e, "treating corrupt entry as a miss");
        }
    }

    // Miss: contact the responder the client named
    if !state.config.upstream.allows(&host) {
        warn!(client = %peer, upstream = %host, "upstream not in allowlist");
        return reply_error(StatusCode::FORBIDDEN, "upstream not allowed");
    }

    let now = unix_now();
    let fetched = match state.fetcher.fetch_validated(&host, &body).await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(
                client = %peer,
                cache_key = %key,
                upstream = %host,
                error = %e,
                "upstream fetch failed"
            );
            if state.config.evict_on_upstream_failure {
                state.writer.delete(key.clone());
            }
            return reply_error(StatusCode::SERVICE_UNAVAILABLE, "upstream fetch failed");
        }
    };

    let entry = CacheEntry {
        cache_key: key.clone(),
        ocsp_responder: host,
        request: body.to_vec(),
        response: fetched.raw,
        thisupd: fetched.single.this_update,
        nextupd: fetched.single.next_update.unwrap_or(0),
        lastchecked: now,
        status: fetched.single.cert_status,
        nonce: fetched.nonce_count as u32,
    };

    if fetched.nonce_count == 0 {
        state.writer.upsert(entry.clone());
    } else {
        info!(
            cache_key = %key,
            nonce_count = fetched.nonce_count,
            "nonced response served but not cached"
        );
    }

    info!(
        client = %peer,
        cache_key = %key,
        disposition = "direct",
        "request served"
    );
    serve(&entry)
}

/// Forward a multi-certificate request verbatim and relay the upstream reply
/// unchanged. Nothing is cached.
async fn bypass(state: &ProxyState, peer: SocketAddr, host: &str, body: &Bytes) -> Response {
    if !state.config.upstream.allows(host) {
        warn!(client = %peer, upstream = %host, "upstream not in allowlist");
        return reply_error(StatusCode::FORBIDDEN, "upstream not allowed");
    }

    match state.fetcher.forward(host, body).await {
        Ok((status, headers, bytes)) => {
            info!(
                client = %peer,
                upstream = %host,
                status = status.as_u16(),
                "multi-request forwarded"
            );

            let mut relayed = HeaderMap::with_capacity(headers.len());
            for (name, value) in headers.iter() {
                if !is_hop_by_hop(name) {
                    relayed.append(name.clone(), value.clone());
                }
            }
            (status, relayed, bytes).into_response()
        }
        Err(e) => {
            warn!(client = %peer, upstream = %host, error = %e, "multi-request forward failed");
            reply_error(StatusCode::SERVICE_UNAVAILABLE, "upstream fetch failed")
        }
    }
}

/// Headers that belong to the hop, not the message (RFC 9110 §7.6.1), plus
/// `Content-Length`, which hyper recomputes from the relayed body.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

/// Reply 200 with the entry's response body and its validity window mapped
/// onto HTTP caching headers.
fn serve(entry: &CacheEntry) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(OCSP_RESPONSE_CONTENT_TYPE),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(entry.response.len()));
    headers.insert(DATE, http_date(unix_now()));
    headers.insert(EXPIRES, http_date(entry.nextupd));
    headers.insert(LAST_MODIFIED, http_date(entry.thisupd));

    (StatusCode::OK, headers, entry.response.clone()).into_response()
}

fn reply_error(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

/// Unix seconds as an RFC 1123 HTTP date
fn http_date(secs: i64) -> HeaderValue {
    let formatted = DateTime::from_timestamp(secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    HeaderValue::from_str(&formatted)
        .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}
