//! # Cadenza
//!
//! Background audio playback controller. Reads JSON command lines on stdin
//! and writes replies and playback events to stdout.
//!
//! ```text
//! cadenza [CONFIG_PATH]
//! cadenza --list-devices
//! ```

mod surface;
mod transport;

use std::path::Path;

use anyhow::{Context, Result};
use cadenza_audio::software::list_output_devices;
use cadenza_audio::{PlaybackController, SoftwareBackend};
use cadenza_core::Config;
use surface::ConsoleSurface;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "cadenza=info,cadenza_audio=info";

#[tokio::main]
async fn main() -> Result<()> {
    let arg = std::env::args().nth(1);

    if arg.as_deref() == Some("--list-devices") {
        for name in list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = match arg.as_deref() {
        Some(path) => Config::load_from(Path::new(path)),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(config.log_filter.as_deref());
    info!("Starting Cadenza v{}", env!("CARGO_PKG_VERSION"));

    let backend = SoftwareBackend::new(config.backend);
    let handle = PlaybackController::spawn(
        backend.engine_factory(),
        backend.effects_factory(),
        ConsoleSurface::default(),
        config.controller,
    )
    .context("Failed to start playback controller")?;

    transport::serve(handle, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    info!("Cadenza stopped");
    Ok(())
}

/// Log to stderr so stdout stays a clean JSON stream. `RUST_LOG` wins over
/// the configured filter.
fn init_logging(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| configured.unwrap_or(DEFAULT_LOG_FILTER).into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
