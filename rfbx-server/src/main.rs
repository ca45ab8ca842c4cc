//! RFBX server — entry point.
//!
//! ```text
//! rfbx-server                  Run in the foreground
//! rfbx-server --config <path>  Load a custom config TOML
//! rfbx-server --gen-config     Write a default config file and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rfbx_server::config::ServerConfig;
use rfbx_server::service::RfbService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rfbx-server", about = "RFBX screen-sharing server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rfbx-server.toml")]
    config: PathBuf,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: write the defaults to the config path and exit.
    if cli.gen_config {
        ServerConfig::write_default(&cli.config)?;
        println!("wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let config = ServerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rfbx-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "listening on {}:{}",
        config.network.bind_address, config.network.port
    );
    info!(
        "screen: {}x{}, poll every {}ms",
        config.screen.width, config.screen.height, config.screen.poll_interval_ms
    );

    let service = RfbService::new(config);
    let cancel = service.cancel_token();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        cancel.cancel();
    });

    service.run().await?;

    Ok(())
}
