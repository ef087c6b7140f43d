use anyhow::Result;
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use luma_reactive::audio::{FeatureSnapshot, LiveSource, SourceRouter, TickTiming, WavReplay};
use luma_reactive::config::EngineConfig;

#[derive(Parser)]
#[command(name = "feature-dump")]
#[command(about = "Replay a WAV file offline and dump shaped features as JSON")]
struct Args {
    /// WAV file to analyse
    #[arg()]
    input_file: PathBuf,

    /// Output JSON file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON config file (missing file means defaults)
    #[arg(short, long, default_value = "luma.json")]
    config: PathBuf,

    /// Overrides the config's frame rate
    #[arg(long)]
    frame_rate: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DumpFrame {
    time_ms: f64,
    #[serde(flatten)]
    features: FeatureSnapshot,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig::load_or_default(&args.config)?;
    if let Some(frame_rate) = args.frame_rate {
        config.frame_rate = frame_rate;
    }
    let frame_rate = 1.0 / config.frame_interval_secs();

    let replay = WavReplay::open(&args.input_file, config.capture.spectrum_tap(), frame_rate)?;
    let ticks = replay.tick_count();
    let hop_ms = replay.hop() as f64 * 1000.0 / replay.sample_rate().max(1) as f64;
    let step = Duration::from_secs_f64(hop_ms / 1000.0);

    let mut router = SourceRouter::new(config.tuning);
    router.bind(Box::new(LiveSource::new(replay, TickTiming::Fixed(step))));

    let frames: Vec<DumpFrame> = (1..=ticks)
        .map(|tick| DumpFrame {
            time_ms: tick as f64 * hop_ms,
            features: router.current_features(),
        })
        .collect();

    let json = serde_json::to_string_pretty(&frames)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Wrote {} frames to {}", frames.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
