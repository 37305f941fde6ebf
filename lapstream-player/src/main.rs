//! Lapstream Player (lapstream-player) - Main entry point
//!
//! Plays one track from a chunk server: loads stream metadata, applies the
//! requested processing profile, optionally seeks, then plays until the track
//! ends, a fatal error occurs, or the process is interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use lapstream_common::config::{load_or_default, CONFIG_ENV_VAR};
use lapstream_common::events::PlayerEvent;
use lapstream_common::human_time::format_progress;
use lapstream_player::audio::{AudioGraph, MixerGraph};
use lapstream_player::stream::{HttpChunkSource, ProcessingProfile};
use lapstream_player::{PlaybackEngine, PlayerConfig};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lapstream-player
#[derive(Parser, Debug)]
#[command(name = "lapstream-player")]
#[command(about = "Progressive chunked-stream audio player")]
#[command(version)]
struct Args {
    /// Config file (overrides LAPSTREAM_CONFIG and default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chunk service base URL (overrides the config file)
    #[arg(long, env = "LAPSTREAM_BASE_URL")]
    base_url: Option<String>,

    /// Request server-side enhancement
    #[arg(long)]
    enhanced: bool,

    /// Enhancement preset name
    #[arg(long, env = "LAPSTREAM_PRESET")]
    preset: Option<String>,

    /// Processing intensity (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0)]
    intensity: f32,

    /// Master volume (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0, env = "LAPSTREAM_VOLUME")]
    volume: f32,

    /// Start position in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Track to play
    track_id: String,
}

/// How playback finished
enum Outcome {
    Ended,
    Failed(String),
    EventsClosed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_path): (PlayerConfig, Option<PathBuf>) =
        load_or_default(args.config.as_deref(), CONFIG_ENV_VAR).context("Failed to load configuration")?;
    if let Some(base_url) = args.base_url.clone() {
        config.engine.base_url = base_url;
    }

    // RUST_LOG wins over the config file level
    let default_filter = format!(
        "lapstream_player={level},lapstream_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lapstream-player v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using defaults"),
    }
    info!("Chunk service: {}", config.engine.base_url);

    let source = Arc::new(HttpChunkSource::from_config(&config.engine).context("Failed to create chunk source")?);

    #[cfg(feature = "device-output")]
    let device = match lapstream_player::audio::DeviceOutput::open(config.output.device.clone()) {
        Ok(device) => Some(device),
        Err(e) => {
            warn!("Audio device unavailable ({}), playing headless", e);
            None
        }
    };
    #[cfg(feature = "device-output")]
    let graph: Arc<dyn AudioGraph> = match &device {
        Some(device) => device.mixer(),
        None => Arc::new(MixerGraph::headless()),
    };
    #[cfg(not(feature = "device-output"))]
    let graph: Arc<dyn AudioGraph> = {
        if config.output.device.is_some() {
            warn!("Output device configured but built without the device-output feature");
        }
        warn!("Built without device output, playing headless");
        Arc::new(MixerGraph::headless())
    };

    let engine =
        PlaybackEngine::new(config.engine.clone(), source, graph).context("Failed to initialize playback engine")?;
    let events = engine.subscribe();

    engine
        .load_track(&args.track_id)
        .await
        .with_context(|| format!("Failed to load track {}", args.track_id))?;

    let profile = ProcessingProfile {
        enhanced: args.enhanced,
        preset: args.preset.clone(),
        intensity: args.intensity,
    };
    engine
        .apply_profile(profile)
        .await
        .context("Failed to apply processing profile")?;
    engine.set_intensity(args.intensity).context("Invalid intensity")?;
    engine.set_volume(args.volume).context("Invalid volume")?;

    if let Some(start) = args.start {
        let position = engine.seek(start).await.context("Failed to seek")?;
        info!("Starting at {:.1}s", position);
    }

    let duration = engine.get_duration();
    let logger = tokio::spawn(log_events(events, duration));

    let playing = engine.clone();
    let outcome = tokio::select! {
        outcome = async move {
            playing.play().await.context("Failed to start playback")?;
            logger.await.context("Event logger failed")
        } => outcome,
        _ = shutdown_signal() => Ok(Outcome::EventsClosed),
    };

    engine.shutdown();

    match outcome? {
        Outcome::Ended => {
            info!("Playback complete");
            Ok(())
        }
        Outcome::Failed(message) => Err(anyhow!("Playback failed: {}", message)),
        Outcome::EventsClosed => {
            info!("Playback stopped");
            Ok(())
        }
    }
}

/// Log engine events until the track ends or fails
async fn log_events(mut events: broadcast::Receiver<PlayerEvent>, duration: Option<f64>) -> Outcome {
    loop {
        match events.recv().await {
            Ok(PlayerEvent::StateChanged { old_state, new_state, .. }) => {
                info!("State: {} -> {}", old_state, new_state);
            }
            Ok(PlayerEvent::TimeUpdate { position_secs, .. }) => {
                debug!("{}", format_progress(position_secs, duration));
            }
            Ok(PlayerEvent::ChunkLoaded { chunk_index, from_cache, .. }) => {
                debug!("Chunk {} ready{}", chunk_index, if from_cache { " (cache)" } else { "" });
            }
            Ok(PlayerEvent::ChunkError { chunk_index, error, .. }) => {
                warn!("Chunk {} error: {}", chunk_index, error);
            }
            Ok(PlayerEvent::Ended { track_id, .. }) => {
                info!("Track {} ended", track_id);
                return Outcome::Ended;
            }
            Ok(PlayerEvent::Error { message, .. }) => {
                error!("Player error: {}", message);
                return Outcome::Failed(message);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return Outcome::EventsClosed,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
