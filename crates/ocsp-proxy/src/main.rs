use clap::Parser;
use ocsp_proxy::{CacheStore, ProxyConfig, ProxyServer, ValkeyStore};
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Proxies OCSP requests and caches their responses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ocsp_proxy")]
struct Cli {
    /// The ip address/hostname to listen on
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// The port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Valkey/Redis URL of the shared cache store
    #[arg(short = 's', long, value_name = "URL")]
    store_url: Option<String>,

    /// Cache key prefix
    #[arg(short = 'x', long)]
    prefix: Option<String>,

    /// Path to a JSON configuration file (flags override file values)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ProxyConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("cannot load configuration from {}: {}", path, e);
                process::exit(1);
            }
        },
        None => ProxyConfig::default(),
    };

    if let Some(host) = cli.host {
        config.listen_address = host;
    }
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(url) = cli.store_url {
        config.store.url = url;
    }
    if let Some(prefix) = cli.prefix {
        config.store.key_prefix = prefix;
    }
    if cli.verbose {
        config.verbose = true;
    }

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        process::exit(1);
    }

    // The store must be reachable before we accept a single request
    let store = match ValkeyStore::connect(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!(url = %config.store.url, error = %e, "cannot connect to cache store");
            process::exit(1);
        }
    };
    if let Err(e) = store.ping().await {
        error!(url = %config.store.url, error = %e, "cache store did not answer PING");
        process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = %config.store.url,
        prefix = %config.store.key_prefix,
        "starting OCSP proxy"
    );

    let config = Arc::new(config);
    let store: Arc<dyn CacheStore> = Arc::new(store);

    let server = match ProxyServer::bind(config, store).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "cannot bind listener");
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "server terminated");
        process::exit(1);
    }
}
