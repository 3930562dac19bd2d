use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use gemini_live_host_api::{InboundMessageType, SharedEventSink, Transport, TransportEvent};
use gemini_live_transport::{
    GeminiLiveTransport, LiveConfig,
    core::audio::{AudioBackend, CpalBackend},
};

/// Gemini Live - talk to Gemini Multimodal Live from the terminal
#[derive(Parser, Debug)]
#[command(name = "gemini-live")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key (overrides GEMINI_API_KEY and the config file)
    #[arg(long = "api-key", value_name = "KEY")]
    api_key: Option<String>,

    /// Model name, e.g. models/gemini-2.0-flash-exp
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Connect without sending microphone audio
    #[arg(long = "no-mic")]
    no_mic: bool,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available input devices
    Devices,
}

fn log_event(event: TransportEvent) {
    match event {
        TransportEvent::StateChanged(state) => info!("Transport state: {}", state.as_str()),
        TransportEvent::BotStartedSpeaking(_) => info!("Bot started speaking"),
        TransportEvent::BotStoppedSpeaking(_) => info!("Bot stopped speaking"),
        TransportEvent::UserStartedSpeaking => info!("User interrupted"),
        TransportEvent::MicUpdated(mic) => {
            info!("Microphone: {}", mic.map(|m| m.name).unwrap_or_else(|| "none".to_string()))
        }
        TransportEvent::AvailableMicsUpdated(mics) => {
            debug!("{} input device(s) available", mics.len())
        }
        TransportEvent::Message(message) if message.msg_type == InboundMessageType::BotReady => {
            info!("Bot ready")
        }
        TransportEvent::UserAudioLevel(_) | TransportEvent::RemoteAudioLevel { .. } => {}
        other => debug!("Transport event: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new());

    // Handle subcommands
    if let Some(command) = cli.command {
        match command {
            Commands::Devices => {
                let default = backend.default_input_device().map(|d| d.id);
                for device in backend
                    .input_devices()
                    .map_err(|e| anyhow!("Failed to list input devices: {}", e))?
                {
                    let marker = if Some(&device.id) == default.as_ref() { "*" } else { " " };
                    println!("{} {} ({})", marker, device.name, device.id);
                }
                return Ok(());
            }
        }
    }

    // Load configuration from file or environment
    let mut config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        LiveConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        LiveConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if cli.no_mic {
        config.enable_mic = false;
    }
    if !config.has_api_key() {
        anyhow::bail!("No API key configured. Set GEMINI_API_KEY or pass --api-key");
    }

    let events: SharedEventSink = Arc::new(log_event);
    let transport = GeminiLiveTransport::new(
        config.to_client_options(),
        config.to_transport_settings(),
        backend,
        events,
    );

    transport
        .init_devices()
        .await
        .map_err(|e| anyhow!("Failed to initialize devices: {}", e))?;

    info!("Connecting to {} with {}", config.endpoint, config.model);
    if let Err(e) = transport.connect().await {
        transport.release();
        return Err(anyhow!("Failed to connect: {}", e));
    }

    info!("Connected. Press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to listen for Ctrl+C: {}", e))?;

    if let Err(e) = transport.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    transport.release();
    info!("Session closed");

    Ok(())
}
