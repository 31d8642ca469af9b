//! Pipe Bridge Application
//!
//! Streams a test tone through an external process and reports what comes
//! back: metadata events as JSON lines on stdout, statistics in the log.
//!
//! Usage: `pipe-bridge [config.toml] [seconds]`

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipe_bridge::{audio::ToneSource, clock::Clock, config::PipeConfig, PipeOperator};

/// Graph tick length
const TICK: Duration = Duration::from_millis(20);

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pipe-bridge").map(|dirs| dirs.config_dir().join("pipe.toml"))
}

fn load_config(arg: Option<String>) -> Result<PipeConfig> {
    let path = arg.map(PathBuf::from).or_else(|| {
        default_config_path().filter(|path| path.exists())
    });
    match path {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            PipeConfig::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            tracing::info!("No config file, piping through `cat`");
            Ok(PipeConfig::new("cat"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Pipe Bridge");

    let mut args = std::env::args().skip(1);
    let config = load_config(args.next())?;
    let seconds: u64 = match args.next() {
        Some(arg) => arg.parse().context("seconds must be a whole number")?,
        None => 10,
    };

    let format = config.format;
    let frames_per_tick = (format.sample_rate as u64 * TICK.as_millis() as u64 / 1000) as usize;
    // A new tone "track" every 5 seconds
    let tone = ToneSource::new(
        440.0,
        format.sample_rate,
        format.channels,
        frames_per_tick,
        (5000 / TICK.as_millis()) as u32,
    );

    let master = Clock::new("main");
    let mut operator = PipeOperator::new(config, tone, master.clone())?;
    operator.wake_up()?;

    let mut interval = tokio::time::interval(TICK);
    let ticks = seconds * 1000 / TICK.as_millis() as u64;
    let mut frames_out = 0usize;
    let mut tracks = 0usize;

    for _ in 0..ticks {
        interval.tick().await;
        if let Some(block) = operator.get(frames_per_tick) {
            for (offset, metadata) in &block.metadata {
                let event = serde_json::json!({
                    "position": frames_out + offset,
                    "metadata": metadata,
                });
                println!("{}", event);
            }
            frames_out += block.frames();
            if block.ends_track {
                tracks += 1;
                tracing::info!("Track {} ended at frame {}", tracks, frames_out);
            }
        }
        master.end_tick();
    }

    operator.shutdown().await;

    let stats = operator.stats();
    tracing::info!(
        "Done: {} frames out over {} graph ticks, {} slave ticks, {} tracks",
        frames_out,
        master.ticks(),
        operator.clock().ticks(),
        tracks
    );
    tracing::info!("Stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}
