//! Tonearm - play local files and library streams from the terminal

mod config;
mod player;

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use tonearm_audio_desktop::{CpalContext, DecoderTransport};
use tonearm_playback::{AudioContext, PlaybackEngine, Track};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TonearmConfig;

#[derive(Parser)]
#[command(name = "tonearm")]
#[command(about = "Play audio files and HTTP streams", long_about = None)]
struct Cli {
    /// Files, file:// URLs or http(s):// URLs, played in order
    #[arg(required = true)]
    tracks: Vec<String>,

    /// Output volume (0.0-1.0)
    #[arg(short, long, env = "TONEARM_VOLUME")]
    volume: Option<f32>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "tonearm=info,tonearm_playback=info,tonearm_audio_desktop=info".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = TonearmConfig::load(cli.config.as_deref())?;
    if let Some(volume) = cli.volume {
        config.engine.initial_volume = volume.clamp(0.0, 1.0);
    }

    let context = CpalContext::open()?;
    let format = context.format();
    tracing::info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "Audio output opened"
    );
    let transport = DecoderTransport::new(config.desktop.clone())?;
    let engine =
        PlaybackEngine::open(config.engine.clone(), Box::new(context), Box::new(transport))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            stop_tx.send(true).ok();
        }
    });

    let tracks = cli.tracks.into_iter().map(Track::from_locator).collect();
    let outcome = player::play_all(&engine, tracks, stop_rx).await;

    engine.shutdown().await?;
    let report = outcome?;
    tracing::info!(
        finished = report.finished,
        skipped = report.skipped,
        "Playback done"
    );
    Ok(())
}
