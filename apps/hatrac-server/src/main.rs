//! Hatrac object-storage server.
//!
//! # Usage
//!
//! ```text
//! hatrac-server [serve]                     run the HTTP service
//! hatrac-server deploy <admin-role>...      initialize schema and root ACLs
//! hatrac-server migrate link <url-prefix>   rewrite versions into remote links
//! hatrac-server migrate transfer            pull linked content back locally
//! ```
//!
//! Configuration comes from `hatrac_config.json` (override the path with
//! `HATRAC_CONFIG`). `RUST_LOG` overrides the configured log level.

mod migrate;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hatrac_core::HatracConfig;
use hatrac_core::context::TrustedHeaderAuthn;
use hatrac_directory::store::Directory;
use hatrac_http::{HatracProvider, HatracService};
use hatrac_storage::backend_from_config;

/// Server version reported in logs.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise the configured log level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the shared provider from configuration.
async fn build_provider(config: Arc<HatracConfig>) -> Result<Arc<HatracProvider>> {
    let directory = Directory::connect(&config.database_dsn, config.database_max_retries)
        .await
        .context("opening metadata database")?;
    let storage = backend_from_config(&config.storage)
        .await
        .context("initializing storage backend")?;
    Ok(Arc::new(HatracProvider::new(config, directory, storage)))
}

/// Run the accept loop, serving connections until a shutdown signal.
async fn serve(config: Arc<HatracConfig>) -> Result<()> {
    let provider = build_provider(Arc::clone(&config)).await?;
    let service = HatracService::new(provider, Arc::new(TrustedHeaderAuthn));

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind_address))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        service_prefix = %config.service_prefix,
        storage = ?config.storage.storage_backend,
        version = VERSION,
        "hatrac listening"
    );

    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");
    Ok(())
}

/// Initialize the database schema and grant root ownership.
async fn deploy(config: Arc<HatracConfig>, admin_roles: &[String]) -> Result<()> {
    if admin_roles.is_empty() {
        bail!("deploy requires at least one admin role");
    }
    let directory = Directory::connect(&config.database_dsn, config.database_max_retries)
        .await
        .context("opening metadata database")?;
    directory
        .deploy(admin_roles)
        .await
        .context("deploying schema")?;
    info!(roles = ?admin_roles, "deployed hatrac database");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(HatracConfig::load().context("loading configuration")?);
    init_tracing(&config.log_level)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(config).await,
        Some("deploy") => deploy(config, &args[1..]).await,
        Some("migrate") => {
            let mode = args
                .get(1)
                .map(String::as_str)
                .context("migrate requires a mode: link or transfer")?;
            match mode {
                "link" => {
                    let remote = args
                        .get(2)
                        .context("migrate link requires a remote URL prefix")?;
                    migrate::link(config, remote).await
                }
                "transfer" => migrate::transfer(config).await,
                other => bail!("unknown migrate mode {other:?}"),
            }
        }
        Some(other) => bail!("unknown command {other:?}"),
    }
}
