//! snaplink receiver entry point.
//!
//! ```text
//! snaplink-receiver                       Listen with snaplink-receiver.toml
//! snaplink-receiver --config <path>       Use custom config TOML
//! snaplink-receiver --listen 0.0.0.0:7000 Override the listen address
//! snaplink-receiver --record out.cap      Record snapshots to a capture file
//! snaplink-receiver --gen-config          Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snaplink_core::FrameVariant;
use snaplink_receiver::config::ReceiverAppConfig;
use snaplink_receiver::service::ReceiverService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "snaplink-receiver", about = "Receive delta-compressed snapshots")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "snaplink-receiver.toml")]
    config: PathBuf,

    /// Listen address (overrides config). Example: 0.0.0.0:7000
    #[arg(short, long)]
    listen: Option<String>,

    /// Expect single-length frames (async senders).
    #[arg(long)]
    single: bool,

    /// Record received snapshots to this capture file.
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverAppConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ReceiverAppConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen = addr;
    }
    if cli.single {
        config.receiver.variant = FrameVariant::Single;
    }
    if let Some(path) = cli.record {
        config.output.record = path;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("snaplink-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("frame variant: {:?}", config.receiver.variant);
    if let Some(path) = config.record_path() {
        info!("recording to {}", path.display());
    }

    let mut service = ReceiverService::bind(config)?;
    info!("listening on {}", service.local_addr());
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let received = tokio::task::spawn_blocking(move || service.run()).await??;
    info!("received {received} snapshots");

    Ok(())
}
