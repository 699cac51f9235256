//! OCSP Caching Forward Proxy
//!
//! This crate implements a caching forward proxy for the Online Certificate
//! Status Protocol. TLS servers (e.g. Apache mod_ssl stapling) POST
//! DER-encoded OCSP requests to it; responses are served from a shared
//! Valkey/Redis cache or fetched from the upstream responder named in the
//! `Host` header. A background refresher re-validates cached entries before
//! they expire, and every store mutation is funneled through a single
//! serialized writer.
//!
//! # Example
//!
//! ```rust,no_run
//! use ocsp_proxy::{CacheStore, ProxyConfig, ProxyServer, ValkeyStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ProxyConfig::default());
//!
//!     let store: Arc<dyn CacheStore> = Arc::new(ValkeyStore::connect(&config.store).await?);
//!
//!     let server = ProxyServer::bind(config, store).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entry;
pub mod fetch;
pub mod handler;
pub mod refresher;
pub mod server;
pub mod store;
pub mod writer;

pub use config::{ConfigError, ProxyConfig, RefreshConfig, StoreConfig, UpstreamConfig};
pub use entry::{cache_key, CacheEntry};
pub use fetch::{FetchError, FetchedResponse, OcspFetcher, UpstreamError};
pub use handler::ProxyState;
pub use refresher::Refresher;
pub use server::{ProxyServer, ServerError};
pub use store::{CacheStore, MemoryStore, StoreError, ValkeyStore};
pub use writer::{CacheWriter, WriteIntent};
