//! GNSS Gateway - Main Entry Point
//!
//! Connects to the broker, subscribes to the configured topics, and
//! prints one dispatch line per received message until interrupted.

use clap::{Parser, Subcommand};
use gnss_gateway::config::GatewayConfig;
use gnss_gateway::dispatch::Dispatcher;
use gnss_gateway::error::{GatewayError, GatewayResult};
use gnss_gateway::observability::init_default_logging;
use gnss_gateway::transport::{MqttTransport, Transport};
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info};

/// GNSS gateway - MQTT message dispatcher
#[derive(Parser)]
#[command(name = "gnss-gateway")]
#[command(about = "MQTT gateway dispatching GNSS tracker messages to console actions")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting GNSS gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_gateway(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Gateway shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> GatewayResult<GatewayConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(GatewayConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = vec!["gateway.toml", "config/gateway.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(GatewayConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create gateway.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_gateway(config: GatewayConfig) -> GatewayResult<()> {
    info!("Gateway starting with ID: {}", config.gateway.id);

    let mut transport = MqttTransport::new(&config.gateway.id, config.mqtt.clone())?;

    // Channel-based hand-off from the event-loop task to this single
    // consumer; messages are dispatched one at a time, in arrival order
    let (message_tx, mut message_rx) = mpsc::channel(64);
    transport.set_message_sender(message_tx).await;

    // Broker unreachable at startup is fatal
    transport.connect().await?;
    transport.subscribe_to_topics().await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    println!("Waiting for messages... Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            message = message_rx.recv() => {
                match message {
                    Some(message) => {
                        let (_, line) = Dispatcher::dispatch(&message);
                        println!("{line}");
                    }
                    None => {
                        error!("Message channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = monitor_connection_health(&transport) => {
                error!("MQTT connection permanently lost, shutting down gateway...");
                break;
            }
        }
    }

    info!("Gateway shutdown initiated");
    if let Err(e) = transport.disconnect().await {
        error!("Error during shutdown: {}", e);
        return Err(e.into());
    }

    Ok(())
}

fn handle_config_command(config: GatewayConfig, show: bool) -> GatewayResult<()> {
    if show {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| GatewayError::internal_error(e.to_string()))?;
        println!("Current gateway configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolve once the transport reports a permanent disconnection.
async fn monitor_connection_health<T: Transport>(transport: &T) {
    loop {
        if transport.is_permanently_disconnected() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
}
