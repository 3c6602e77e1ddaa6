//! tether - an interactive terminal client for WebSocket pub/sub channels

use anyhow::Result;
use clap::Parser;
use tether::client::address::normalize_address;
use tether::client::console::Console;
use tether::client::input::LineInput;
use tether::client::{run_session, SessionOptions};
use tether::config::Config;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "An interactive terminal client for WebSocket pub/sub channels")]
#[command(version)]
struct Cli {
    /// Server address (prompted for when omitted)
    #[arg(short, long)]
    server: Option<String>,

    /// Username to identify with on a channel server
    #[arg(short, long)]
    username: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Seconds to wait for the server's first message
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout belongs to the session
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(secs) = cli.timeout {
        config.general.handshake_timeout_secs = secs;
    }

    let console = Console::stdout(config.appearance.colors && !cli.no_color);
    let mut input = LineInput::stdin();

    console.notice("WebSocket Channel Client");
    console.notice("=".repeat(25));

    let address = match cli.server {
        Some(server) => server,
        None => {
            let question = format!(
                "Enter WebSocket server address (default: {}): ",
                config.general.default_server
            );
            input.prompt(&console, &question, "").await
        }
    };
    let uri = normalize_address(&address, &config.general);
    console.notice(format!("Connecting to {uri}..."));

    let mut options = SessionOptions::from_config(&config);
    options.username = cli.username;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match run_session(&uri, &options, input, &console, interrupt).await {
        Ok(summary) => {
            tracing::info!("Session {} ended: {:?}", summary.id, summary.end);
            console.notice("Goodbye!");
        }
        Err(e) => {
            // Already reported on the console
            tracing::debug!("Session failed: {:#}", e);
        }
    }

    Ok(())
}
