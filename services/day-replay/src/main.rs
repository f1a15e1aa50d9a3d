//! Day Replay CLI
//!
//! Command-line interface for the day timeline replay service.

use std::path::PathBuf;

use clap::Parser;
use day_replay::{load_config, Config, ReplayBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "day-replay")]
#[command(about = "Day timeline replay service for Home Assistant")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API port (overrides config file)
    #[arg(long)]
    api_port: Option<u16>,

    /// Minutes east of UTC used to split days (overrides config file)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

/// Command-line values win over the configuration file
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(api_port) = args.api_port {
        config.api.port = api_port;
    }
    if let Some(minutes) = args.utc_offset_minutes {
        config.timezone.utc_offset_minutes = Some(minutes);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, api_port={:?}, utc_offset_minutes={:?}, log_level={:?}",
        args.config,
        args.api_port,
        args.utc_offset_minutes,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets()?;

    apply_overrides(&mut config, &args);

    tracing::info!(
        "Starting day replay for {} entities and {} sensors from {}",
        config.entities.len(),
        config.sensors.len(),
        config.home_assistant.base_url()
    );
    tracing::info!("Days split at UTC offset {}", config.offset()?);
    if config.live.subscribe {
        tracing::info!(
            "Live updates from {}, polling every {} ms if the subscription drops",
            config.home_assistant.websocket_url(),
            config.live.poll_interval_millis
        );
    } else {
        tracing::info!("Live updates by polling every {} ms", config.live.poll_interval_millis);
    }
    for entity in &config.entities {
        tracing::debug!(
            "Tracking {} as {}",
            entity.entity,
            entity.name.as_deref().unwrap_or(&entity.entity)
        );
    }

    ReplayBuilder::new(config).build().await?.start().await?;

    Ok(())
}
