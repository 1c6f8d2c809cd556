//! MTP Camserver
//!
//! Main entry point for the live-view server.

use std::sync::Arc;

use clap::Parser;
use mtp_camserver::{
    liveview::LvServer,
    state::{AppConfig, AppState},
    web_api,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Live-view streaming server for tethered Nikon cameras
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Bind address (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Probe available resolutions and select the largest
    #[arg(long)]
    max_resolution: bool,

    /// Run without a camera attached
    #[arg(long)]
    dummy: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mtp_camserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MTP Camserver v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = AppConfig::default();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.max_resolution = args.max_resolution;
    config.dummy = args.dummy;

    tracing::info!(
        host = %config.host,
        port = config.port,
        max_resolution = config.max_resolution,
        dummy = config.dummy,
        "Configuration loaded"
    );

    // The MTP transport is provided by the embedding environment; this
    // binary only ships the simulated camera. A hardware transport
    // implements `device::MtpDevice` and is passed to `LvServer::new`.
    let device = None;
    if !config.dummy {
        anyhow::bail!("no MTP transport is linked into this binary; run with --dummy");
    }

    // Build the live-view server (fatal if the device identity fails)
    let lv = Arc::new(LvServer::new(device, config.max_resolution).await?);
    tracing::info!("LvServer initialized");

    let state = AppState {
        config: config.clone(),
        lv: lv.clone(),
    };

    // Create router
    let app = web_api::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Cancellation fans out to every worker and the HTTP server
    let cancel = CancellationToken::new();

    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            ctrlc_cancel.cancel();
        }
    });

    // Start workers
    let worker_cancel = cancel.clone();
    let workers = tokio::spawn(async move {
        if let Err(e) = lv.run(worker_cancel).await {
            tracing::error!(error = %e, "live-view server stopped");
        }
    });

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    cancel.cancel();
    workers.await?;

    Ok(())
}
