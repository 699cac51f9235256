//! Proxy supervisor
//!
//! Wires the long-lived workers together: the write-serializer consumer, the
//! refresher, and the HTTP accept loop. Handlers are spawned per connection
//! by the HTTP stack. Shutdown is process-terminate; there is no graceful
//! drain.

use crate::config::{ConfigError, ProxyConfig};
use crate::fetch::{FetchError, OcspFetcher};
use crate::handler::{self, ProxyState};
use crate::refresher::Refresher;
use crate::store::CacheStore;
use crate::writer;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tower_http::trace::TraceLayer;
use tracing::info;

const LISTEN_BACKLOG: u32 = 5;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Fetcher error: {0}")]
    Fetch(#[from] FetchError),
}

/// The bound-but-not-yet-running proxy
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    store: Arc<dyn CacheStore>,
    listener: TcpListener,
}

impl ProxyServer {
    /// Bind the listen socket.
    ///
    /// Binding is separate from [`run`](ProxyServer::run) so callers (and
    /// tests binding port 0) can read [`local_addr`](ProxyServer::local_addr)
    /// before the accept loop starts.
    pub async fn bind(
        config: Arc<ProxyConfig>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, ServerError> {
        let addr = config.socket_addr()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        info!("OCSP proxy listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            store,
            listener,
        })
    }

    /// The address the listener is bound to
    ///
    /// Useful for tests that bind to port 0 (OS-assigned port).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::from)
    }

    /// Start the workers and drive the accept loop until it fails
    pub async fn run(self) -> Result<(), ServerError> {
        let (cache_writer, _writer_task) = writer::spawn(Arc::clone(&self.store));
        let fetcher = Arc::new(OcspFetcher::new(&self.config.upstream)?);

        let refresher = Refresher::new(
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&fetcher),
            cache_writer.clone(),
        );
        tokio::spawn(refresher.run());

        let state = ProxyState {
            config: self.config,
            store: self.store,
            writer: cache_writer,
            fetcher,
        };

        // Every method and path lands in the one handler
        let app = Router::new()
            .fallback(handler::handle)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}
