//! snaplink sender entry point.
//!
//! ```text
//! snaplink-sender                       Run with snaplink-sender.toml
//! snaplink-sender --config <path>       Load a custom config TOML
//! snaplink-sender --peer host:port      Override the receiver address
//! snaplink-sender --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use snaplink_sender::config::{SenderAppConfig, SenderMode};
use snaplink_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "snaplink-sender", about = "Stream delta-compressed snapshots to a receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "snaplink-sender.toml")]
    config: PathBuf,

    /// Receiver address, overriding `network.peer`.
    #[arg(short, long)]
    peer: Option<String>,

    /// Sender flavour, overriding `sender.mode`.
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Stop after this many snapshots.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Sync,
    Async,
}

impl From<ModeArg> for SenderMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Sync => SenderMode::Sync,
            ModeArg::Async => SenderMode::Async,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderAppConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderAppConfig::load(&cli.config);
    if let Some(peer) = cli.peer {
        config.network.peer = peer;
    }
    if let Some(mode) = cli.mode {
        config.sender.mode = mode.into();
    }
    if let Some(count) = cli.count {
        config.sender.max_snapshots = count;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("snaplink-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("peer: {}", config.network.peer);
    info!("mode: {:?}, rate: {} Hz", config.sender.mode, config.sender.rate_hz);
    info!("source: {:?}", config.source.kind);
    info!("compression: {:?}", config.codec.compression);

    let service = SenderService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let sent = tokio::task::spawn_blocking(move || service.run()).await??;
    info!("sent {sent} snapshots");

    Ok(())
}
