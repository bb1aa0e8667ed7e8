//! Craft client entry point.
//!
//! Loads the configuration, opens a connection to the game server, and logs
//! every event it reports until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config_from()     -- TOML file, CLI overrides on top
//!  └─ Connection::open()     -- reconnecting driver task
//!  └─ event loop
//!       ├─ Command(msg)      -> debug log
//!       ├─ Connect / Close   -> info / warn
//!       └─ Ctrl-C            -> close() and exit
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use craft_client::infrastructure::network::{Connection, Event};
use craft_client::infrastructure::storage::config::{load_config_from, ClientConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Connects to a Craft game server and logs the protocol traffic.
#[derive(Debug, Parser)]
#[command(name = "craft-client", about = "Self-healing Craft game server client", version)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "craft-client.toml", env = "CRAFT_CONFIG")]
    config: PathBuf,

    /// Game server host, overriding `[server] host`.
    #[arg(long, env = "CRAFT_HOST")]
    host: Option<String>,

    /// Game server port, overriding `[server] port`.
    #[arg(long, env = "CRAFT_PORT")]
    port: Option<u16>,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> anyhow::Result<ClientConfig> {
        let mut config = load_config_from(&self.config)
            .with_context(|| format!("loading config from {}", self.config.display()))?;
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let runtime = config.to_connection_config();
    info!(host = %runtime.host, port = runtime.port, "craft client starting");

    let connection = Connection::open(runtime, None);
    let mut events = connection.listen();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    error!("failed to listen for Ctrl-C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    connection.close();
    info!("craft client stopped");
    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::Connect => info!("connected"),
        Event::Command(msg) => debug!(code = %msg.code, fields = msg.fields.len(), "server command"),
        Event::Data(bytes) => debug!(len = bytes.len(), "data"),
        Event::End => info!("server ended the connection"),
        Event::Close => warn!("connection lost; reconnect scheduled"),
        Event::Timeout => warn!("connection timed out"),
        Event::Error(e) => warn!("{e}"),
        Event::Reconnect | Event::Drain => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
