//! huesync-server entry point.
//!
//! Wires together the infrastructure services and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (TOML, defaults written on first run), init tracing
//!  └─ SessionController::restore()   -- client.json → quick-start
//!  └─ start services
//!       ├─ FrameListener       (UDP background thread)
//!       ├─ FrameChannelAdapter (Tokio task)
//!       └─ AnnounceSupervisor  (Tokio task, UDP broadcast)
//!  └─ Ctrl-C: end stream → close bridge → stop announcing → stop frames
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use huesync_core::{SessionStatus, SystemClock};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use huesync_server::application::announce::AnnounceSupervisor;
use huesync_server::application::bridge_client::BridgeClient;
use huesync_server::application::bridge_manager::BridgeConnectionManager;
use huesync_server::application::controller::SessionController;
use huesync_server::application::frame_adapter::{frame_channel, FrameChannelAdapter};
use huesync_server::application::response::CommandResult;
use huesync_server::application::session_store::SessionStore;
use huesync_server::infrastructure::bridge::simulated::SimulatedBridge;
use huesync_server::infrastructure::network::announcer::UdpAnnouncer;
use huesync_server::infrastructure::network::frame_listener::start_frame_listener;
use huesync_server::infrastructure::storage::config::{config_file_path, load_or_init_config};
use huesync_server::infrastructure::storage::credentials::JsonCredentialStore;

/// Streams producer colour frames to a Hue entertainment area.
#[derive(Debug, Parser)]
#[command(name = "huesync-server", version, about)]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, env = "HUESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, env = "HUESYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// UDP port the producer sends frames to.
    #[arg(long, env = "HUESYNC_FRAME_PORT")]
    frame_port: Option<u16>,

    /// Entertainment area to stream once the stored session is restored.
    #[arg(long, env = "HUESYNC_AREA")]
    area: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("resolving config file path")?,
    };
    let (mut cfg, first_run) = load_or_init_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    if let Some(level) = cli.log_level {
        cfg.server.log_level = level;
    }
    if let Some(port) = cli.frame_port {
        cfg.producer.frame_port = port;
    }
    if cli.area.is_some() {
        cfg.bridge.auto_stream_area = cli.area;
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    info!("huesync-server starting (config {})", config_path.display());
    if first_run {
        info!("wrote default config to {}", config_path.display());
    }

    // ── Session control ───────────────────────────────────────────────────────
    let client: Arc<dyn BridgeClient> = Arc::new(SimulatedBridge::demo());
    let session = Arc::new(SessionStore::new());
    let bridge = Arc::new(BridgeConnectionManager::new(
        Arc::clone(&client),
        Arc::new(SystemClock),
        cfg.bridge.timings(),
    ));
    let credentials_path = cfg.credentials_path(&config_path);
    info!("credential file: {}", credentials_path.display());
    let controller = SessionController::new(
        Arc::clone(&session),
        Arc::clone(&bridge),
        client,
        Arc::new(JsonCredentialStore::new(credentials_path)),
        cfg.bridge.app_name.clone(),
    );

    let status = controller.restore().await;
    info!("session status after restore: {status}");

    // ── Producer frames ───────────────────────────────────────────────────────
    let (frames_tx, frames_rx) = frame_channel();
    let adapter = Arc::new(FrameChannelAdapter::new(Arc::clone(&session), Arc::clone(&bridge)));
    let adapter_task = tokio::spawn(Arc::clone(&adapter).run(frames_rx));

    let frame_addr = SocketAddr::from(([127, 0, 0, 1], cfg.producer.frame_port));
    let listener = start_frame_listener(frame_addr, frames_tx)
        .with_context(|| format!("starting frame listener on {frame_addr}"))?;

    if let (SessionStatus::Ready, Some(area)) = (status, cfg.bridge.auto_stream_area.as_deref()) {
        let result = CommandResult::from(controller.begin_stream(area).await);
        match &result.error {
            None => info!("auto-stream started on area {area}"),
            Some(e) => warn!("auto-stream on area {area} failed: {} ({})", e.message, e.code.as_str()),
        }
    }

    // ── Announcement ──────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let announce_task = if cfg.announce.enabled {
        let target: SocketAddr = format!(
            "{}:{}",
            cfg.announce.broadcast_address, cfg.announce.broadcast_port
        )
        .parse()
        .context("parsing announce broadcast address")?;
        let advertiser = Arc::new(UdpAnnouncer::new(target, cfg.announce.interval()));
        let supervisor = AnnounceSupervisor::new(
            advertiser,
            cfg.server.metadata(),
            cfg.announce.retry_policy(),
        );
        Some(tokio::spawn(async move { supervisor.run(shutdown_rx).await }))
    } else {
        info!("announcement disabled");
        None
    };

    info!("huesync-server ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    controller.shutdown().await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = announce_task {
        match task.await {
            Ok(attempts) => info!("announce supervisor exited after {attempts} attempt(s)"),
            Err(e) => warn!("announce supervisor task failed: {e}"),
        }
    }

    // Dropping the listener's sender ends the adapter loop.
    listener.stop();
    if let Err(e) = adapter_task.await {
        warn!("frame adapter task failed: {e}");
    }

    info!("huesync-server stopped");
    Ok(())
}
