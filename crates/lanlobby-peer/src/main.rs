//! LanLobby command-line peer.
//!
//! # Usage
//!
//! ```text
//! lanlobby [--config PATH] host [--name NAME]
//! lanlobby [--config PATH] scan [--seconds N] [--json]
//! lanlobby [--config PATH] join [--lobby NAME] [--wait-seconds N]
//! ```
//!
//! `host` and `join` end in an interactive chat: every line typed on stdin is
//! sent to the peer, and the peer's messages are printed as they arrive.
//! Ctrl+C (or closing stdin) leaves the session.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load AppConfig (platform file or --config)
//!  └─ host: ChatOrchestrator::launch(Host)  ── advertiser + listener
//!     scan: LobbyScanner                    ── prints lobbies
//!     join: LobbyBrowser → ChatOrchestrator::launch(Join)
//!  └─ chat_loop(): stdin lines ⇄ ChatState updates
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanlobby_core::{ChatPhase, LobbyName, Role};
use lanlobby_peer::application::{ChatError, ChatOrchestrator, LaunchArgs, LobbyBrowser};
use lanlobby_peer::infrastructure::network::LobbyScanner;
use lanlobby_peer::infrastructure::storage::config::{self, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serverless one-to-one chat on the local network.
#[derive(Debug, Parser)]
#[command(name = "lanlobby", about = "LAN lobby discovery and one-to-one chat", version)]
struct Cli {
    /// Configuration file to use instead of the platform default.
    #[arg(long, global = true, env = "LANLOBBY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Advertise a lobby and chat with the first guest that joins.
    Host {
        /// Lobby name; defaults to `peer.display_name` from the config.
        #[arg(long)]
        name: Option<String>,
    },
    /// List lobbies advertised on the LAN.
    Scan {
        /// How long to listen for advertisements.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
        /// Print one JSON object per lobby update.
        #[arg(long)]
        json: bool,
    },
    /// Find a lobby and join it.
    Join {
        /// Lobby to join; the first one found when omitted.
        #[arg(long)]
        lobby: Option<String>,
        /// How long to scan before giving up.
        #[arg(long, default_value_t = 10)]
        wait_seconds: u64,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_config().unwrap_or_else(|e| {
            eprintln!("using default configuration: {e}");
            AppConfig::default()
        }),
    };

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.peer.log_level)),
        )
        .init();

    match cli.command {
        Command::Host { name } => host(&app_config, name).await,
        Command::Scan { seconds, json } => scan(&app_config, seconds, json).await,
        Command::Join {
            lobby,
            wait_seconds,
        } => join(&app_config, lobby, wait_seconds).await,
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

async fn host(app_config: &AppConfig, name: Option<String>) -> anyhow::Result<()> {
    let raw_name = name.unwrap_or_else(|| app_config.peer.display_name.clone());
    let lobby_name = LobbyName::new(&raw_name)
        .with_context(|| format!("invalid lobby name {raw_name:?}"))?;

    let chat = ChatOrchestrator::launch(LaunchArgs::Host { lobby_name }, app_config)
        .await
        .context("starting lobby")?;
    println!("hosting lobby '{raw_name}', waiting for a guest...");
    chat_loop(chat).await
}

async fn scan(app_config: &AppConfig, seconds: u64, json: bool) -> anyhow::Result<()> {
    let scanner = LobbyScanner::new(app_config.scanner_config()?);
    let mut handle = scanner.start().await.context("starting scan")?;
    info!("scanning for {seconds}s on {}", handle.local_addr());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = tokio::time::timeout_at(deadline, handle.next()) => match update {
                Ok(Some(lobby)) => {
                    if json {
                        println!("{}", serde_json::to_string(&lobby)?);
                    } else {
                        let latency = lobby
                            .latency_ms()
                            .map(|ms| format!("{ms} ms"))
                            .unwrap_or_else(|| "-".to_string());
                        println!("{:<32} {:<22} {latency}", lobby.name, lobby.address);
                    }
                }
                Ok(None) | Err(_) => break,
            },
        }
    }

    let lobbies = handle.stop().await;
    if !json {
        println!("{} lobbies found", lobbies.len());
    }
    Ok(())
}

async fn join(app_config: &AppConfig, wanted: Option<String>, wait_seconds: u64) -> anyhow::Result<()> {
    let mut browser = LobbyBrowser::new(app_config.scanner_config()?);
    browser.start_scan().await.context("starting scan")?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_seconds);
    loop {
        let updated = matches!(
            tokio::time::timeout_at(deadline, browser.next_update()).await,
            Ok(Some(_))
        );
        if !updated {
            break;
        }
        let selected = match &wanted {
            Some(name) => browser.select_by_name(name).is_some(),
            None => match browser.state().lobbies.first().cloned() {
                Some(first) => browser.select_lobby(&first).is_some(),
                None => false,
            },
        };
        if selected {
            break;
        }
    }

    let lobby = browser.finish().await.with_context(|| match &wanted {
        Some(name) => format!("lobby '{name}' not found within {wait_seconds}s"),
        None => format!("no lobby found within {wait_seconds}s"),
    })?;
    println!("joining '{}' at {}...", lobby.name, lobby.address.ip());

    let chat = ChatOrchestrator::launch(LaunchArgs::Join { lobby }, app_config)
        .await
        .context("joining lobby")?;
    chat_loop(chat).await
}

// ── Interactive chat ──────────────────────────────────────────────────────────

async fn chat_loop(chat: ChatOrchestrator) -> anyhow::Result<()> {
    let mut updates = chat.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0usize;
    let mut announced = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received; leaving the session");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                for message in state.messages.iter().skip(shown) {
                    if !message.originated_locally {
                        println!("[{}] peer: {}", message.clock_time(), message.content);
                    }
                }
                shown = state.messages.len();

                if state.phase == ChatPhase::Connected && !announced {
                    announced = true;
                    if let Some(peer) = state.peer_address {
                        println!("connected to {peer}; type a message and press Enter");
                    }
                }
                if state.is_connection_lost {
                    println!("connection lost");
                    break;
                }
                if state.role == Role::Host && state.phase == ChatPhase::Idle {
                    if let Some(reason) = &state.last_error {
                        println!("stopped hosting: {reason}");
                        break;
                    }
                }
            }
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(text) => match chat.send_message(text).await {
                    Ok(_) => {}
                    Err(ChatError::NotConnected) => println!("(no peer yet; message not sent)"),
                    Err(e) => warn!("message not sent: {e}"),
                },
                None => break,
            },
        }
    }

    chat.shutdown().await;
    Ok(())
}
