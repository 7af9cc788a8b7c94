//! Main entry point for the PUG lobby service
//!
//! Runs the service against a console gateway: chat events are read from
//! stdin one per line and replies are printed to stdout.
//!
//! Line format:
//! - `<user> <text>` posts `<text>` as `<user>` in the guild channel
//! - `dm <user> <text>` sends `<text>` to the bot as a direct message

use anyhow::Result;
use clap::Parser;
use pug_lobby::chat::ConsoleChatGateway;
use pug_lobby::config::AppConfig;
use pug_lobby::metrics::MetricsCollector;
use pug_lobby::service::{InboundEvent, PugService};
use pug_lobby::store::DocumentStore;
use pug_lobby::types::{ChannelKind, GuildId, InboundMessage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// PUG Lobby Service - lobbies, registration and team balancing for chat communities
#[derive(Parser)]
#[command(
    name = "pug-lobby",
    version,
    about = "Pick-up game lobbies with player registration and team balancing",
    long_about = "Manages pick-up game lobbies for a chat community: players register a \
                 profile through a direct-message conversation, join lobbies, and owners \
                 split the roster into role- and rating-balanced teams."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long, value_name = "DIR", help = "Override the document data directory")]
    data_dir: Option<PathBuf>,

    /// Guild the console speaks in
    #[arg(
        short,
        long,
        value_name = "ID",
        default_value = "local",
        help = "Guild id used for channel messages read from stdin"
    )]
    guild: GuildId,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig, guild: &GuildId) {
    info!("PUG Lobby Service v{}", pug_lobby::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Data dir: {}", config.storage.data_dir.display());
    info!("   Guild: {}", guild);
    info!(
        "   Registration idle timeout: {}s",
        config.registration.idle_timeout_seconds
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(data_dir) = &args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    pug_lobby::config::validate_config(&config)?;
    Ok(config)
}

/// Turn one console line into an event
fn parse_line(line: &str, guild: &GuildId) -> Option<InboundEvent> {
    let line = line.trim();
    let (first, rest) = line.split_once(char::is_whitespace)?;

    let message = if first == "dm" {
        let (user, text) = rest.trim_start().split_once(char::is_whitespace)?;
        InboundMessage::direct(user, text.trim())
    } else {
        InboundMessage {
            sender_id: first.to_string(),
            channel: ChannelKind::Community {
                guild_id: guild.clone(),
                channel_id: "general".to_string(),
            },
            text: rest.trim().to_string(),
        }
    };

    Some(InboundEvent::Message(message))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config, &args.guild);

    if args.dry_run {
        info!("Dry run completed - configuration is valid");
        return Ok(());
    }

    let store = DocumentStore::filesystem(config.storage.data_dir.clone());
    let metrics = Arc::new(MetricsCollector::new()?);
    let gateway = Arc::new(ConsoleChatGateway::new());

    let mut service = PugService::new(config, store, gateway, metrics);
    service.load_guild(&args.guild).await?;
    service.start().await?;

    info!("Reading events from stdin, press Ctrl+C to shutdown");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("End of input");
                    break;
                };
                let Some(event) = parse_line(&line, &args.guild) else {
                    if !line.trim().is_empty() {
                        warn!("Ignoring malformed line: {}", line);
                    }
                    continue;
                };
                if let Err(e) = service.handle_event(event).await {
                    error!("Event failed: {:#}", e);
                }
            }
        }
    }

    service.shutdown().await?;
    info!("PUG Lobby Service stopped");
    Ok(())
}
