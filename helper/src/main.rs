//! SurfaceSync Helper
//!
//! Serves a surface state and an authoritative clock over WebSocket, and
//! follows such a server headlessly with simulated surfaces.

mod config;
mod follow;
mod protocol;
mod server;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use ss_timesync::TimeSyncServer;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{load_state, HelperConfig};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::AppState;

/// SurfaceSync Helper - surface state server and follower
#[derive(Parser, Debug)]
#[command(name = "surfacesync-helper")]
#[command(about = "Surface state server and headless follower for SurfaceSync")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Run in background (minimal output)
    #[arg(long, global = true)]
    background: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// JSON file with engine and time sync tuning
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a surface state and answer clock sync probes
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "9877")]
        port: u16,

        /// Initial surface state (JSON)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Allowed origins (comma-separated, localhost is always allowed)
        #[arg(long)]
        allowed_origins: Option<String>,
    },

    /// Follow a server with simulated surfaces
    Follow {
        /// Server URL
        #[arg(long, default_value = "ws://127.0.0.1:9877")]
        url: String,

        /// Offset added to the local clock
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        clock_skew_ms: f64,

        /// Seconds between status reports
        #[arg(long, default_value = "5")]
        status_secs: u64,
    },

    /// Publish a surface state to a server, then exit
    Publish {
        /// Server URL
        #[arg(long, default_value = "ws://127.0.0.1:9877")]
        url: String,

        /// Surface state to publish (JSON)
        #[arg(long)]
        state: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    if !args.background {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .compact()
            .init();
    }

    let helper_config = HelperConfig::load(args.config.as_deref())?;

    let result = match args.command {
        Command::Serve {
            host,
            port,
            state,
            allowed_origins,
        } => {
            let initial = load_state(state.as_deref())?;
            let allowed_origins: Vec<String> = allowed_origins
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();

            if !args.background {
                println!();
                println!("╔═══════════════════════════════════════════════════════════╗");
                println!("║         SurfaceSync Helper v{}                       ║", env!("CARGO_PKG_VERSION"));
                println!("╠═══════════════════════════════════════════════════════════╣");
                println!("║  WebSocket: ws://{}:{}                          ║", host, port);
                println!("║  Clips: {}                                                 ║", initial.len());
                println!("╚═══════════════════════════════════════════════════════════╝");
                println!();
            }

            let state = Arc::new(AppState::new(initial, TimeSyncServer::system()));
            let config = server::ServerConfig {
                host,
                port,
                allowed_origins,
            };
            server::run(config, state).await
        }

        Command::Follow {
            url,
            clock_skew_ms,
            status_secs,
        } => {
            let config = follow::FollowConfig {
                url,
                clock_skew_ms,
                status_interval: Duration::from_secs(status_secs.max(1)),
                engine: helper_config.engine,
                timesync: helper_config.timesync,
            };
            follow::run(config).await
        }

        Command::Publish { url, state } => publish(&url, load_state(Some(state.as_path()))?).await,
    };

    if let Err(e) = &result {
        error!("Helper error: {:#}", e);
    }
    result
}

/// Send one state and wait for the server to broadcast it back.
async fn publish(url: &str, surface_state: ss_timeline_eval::SurfaceState) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    let (mut write, mut read) = ws.split();

    let json = serde_json::to_string(&ClientMessage::SurfaceState(surface_state.clone()))?;
    write.send(Message::Text(json)).await?;

    while let Some(msg) = read.next().await {
        let Message::Text(text) = msg? else {
            continue;
        };
        match serde_json::from_str::<ServerMessage>(&text)? {
            ServerMessage::SurfaceState(echoed) if echoed == surface_state => {
                info!("Published {} clip(s) to {}", echoed.len(), url);
                write.send(Message::Close(None)).await?;
                return Ok(());
            }
            ServerMessage::Error { code, message } => bail!("Server rejected state: {} {}", code, message),
            _ => {}
        }
    }

    bail!("Connection closed before the state was acknowledged")
}
