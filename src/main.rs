use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use luma_reactive::audio::{
    FeatureSnapshot, HttpAnalysisApi, LiveSource, LoadError, LoadOutcome, MediaFileTap,
    MicrophoneCapture, PlaybackClock, RemoteFeatureSynthesizer, RemoteSource, SourceRouter,
    TickTiming, TuningUpdate,
};
use luma_reactive::config::EngineConfig;

const TOKEN_ENV: &str = "LUMA_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "luma")]
#[command(about = "Live audio feature monitor for music-reactive visuals")]
struct Args {
    /// JSON config file (missing file means defaults)
    #[arg(short, long, default_value = "luma.json")]
    config: PathBuf,

    /// Write the effective config back to --config and exit
    #[arg(long)]
    save_config: bool,

    #[arg(long)]
    sensitivity: Option<f32>,

    #[arg(long)]
    smoothing: Option<f32>,

    #[arg(long)]
    gamma: Option<f32>,

    #[arg(long)]
    bias: Option<f32>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    #[command(subcommand)]
    source: Option<SourceCommand>,
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Default capture device
    Mic,
    /// Play a local media file and follow it
    File {
        path: PathBuf,
        #[arg(long, default_value = "1.0")]
        volume: f32,
    },
    /// Synthesize features for a remotely playing track
    Remote {
        track_id: String,
        /// Bearer token; falls back to $LUMA_ACCESS_TOKEN
        #[arg(long)]
        token: Option<String>,
        /// Playback position reported by the player when starting
        #[arg(long, default_value = "0")]
        position_ms: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig::load_or_default(&args.config)?;
    config.tuning.apply(&TuningUpdate {
        sensitivity: args.sensitivity,
        smoothing: args.smoothing,
        gamma: args.gamma,
        bias: args.bias,
        ..TuningUpdate::default()
    });

    if args.save_config {
        config.save(&args.config)?;
        return Ok(());
    }

    info!("Starting luma feature monitor");
    info!("Tuning: {:?}", config.tuning);

    let mut router = SourceRouter::new(config.tuning);
    let mut stop_after: Option<Duration> = None;
    let mut remote_load = None;

    match args.source.unwrap_or(SourceCommand::Mic) {
        SourceCommand::Mic => {
            let capture = MicrophoneCapture::new(config.capture.spectrum_tap())?;
            info!("Listening on {}", capture.device_name());
            router.bind(Box::new(LiveSource::new(capture, TickTiming::WallClock)));
        }
        SourceCommand::File { path, volume } => {
            let mut tap = MediaFileTap::open(&path, config.capture.spectrum_tap())?;
            tap.set_volume(volume);
            tap.play()?;
            stop_after = Some(tap.duration());
            router.bind(Box::new(LiveSource::new(tap, TickTiming::WallClock)));
        }
        SourceCommand::Remote {
            track_id,
            token,
            position_ms,
        } => {
            let token = token.or_else(|| std::env::var(TOKEN_ENV).ok());
            let api = Arc::new(HttpAnalysisApi::new(&config.analysis)?);
            let synthesizer = Arc::new(RemoteFeatureSynthesizer::new(api));
            let clock = PlaybackClock::new();
            clock.update(position_ms, false);

            let loader = Arc::clone(&synthesizer);
            remote_load = Some(tokio::spawn(async move {
                loader.load(&track_id, token.as_deref()).await
            }));
            router.bind(Box::new(RemoteSource::new(synthesizer, clock)));
        }
    }

    run_monitor(&mut router, &config, args.frames, stop_after, remote_load).await
}

type RemoteLoad = tokio::task::JoinHandle<Result<LoadOutcome, LoadError>>;

async fn run_monitor(
    router: &mut SourceRouter,
    config: &EngineConfig,
    max_frames: Option<u64>,
    stop_after: Option<Duration>,
    mut remote_load: Option<RemoteLoad>,
) -> Result<()> {
    let interval_secs = config.frame_interval_secs();
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(interval_secs));
    let report_every = (1.0 / interval_secs).round().max(1.0) as u64;
    let started = Instant::now();
    let mut frame: u64 = 0;

    info!("Monitoring {} at {:.0} fps", router.active_source().unwrap_or("nothing"), 1.0 / interval_secs);

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        if let Some(handle) = remote_load.as_mut() {
            if handle.is_finished() {
                match handle.await {
                    Ok(Ok(outcome)) => info!("Remote analysis ready: {:?}", outcome),
                    Ok(Err(e)) => {
                        warn!("Remote analysis unavailable: {}", e);
                        return Err(e.into());
                    }
                    Err(e) => warn!("Remote analysis task failed: {}", e),
                }
                remote_load = None;
            }
        }

        let features = router.current_features();
        frame += 1;
        if frame % report_every == 0 {
            report(frame, &features);
        }

        if max_frames.is_some_and(|max| frame >= max) {
            break;
        }
        if stop_after.is_some_and(|limit| started.elapsed() >= limit) {
            info!("Playback finished");
            break;
        }
    }

    info!("Processed {} frames in {:.1}s", frame, started.elapsed().as_secs_f32());
    Ok(())
}

fn report(frame: u64, features: &FeatureSnapshot) {
    let b = &features.bands;
    let m = &features.metrics;
    info!(
        "#{:>6} sub {:.2} bass {:.2} lowMid {:.2} mid {:.2} highMid {:.2} treble {:.2} vocal {:.2} | energy {:.2} centroid {:.2} flux {:.2} zcr {:.2} beat {:.2}",
        frame, b.sub, b.bass, b.low_mid, b.mid, b.high_mid, b.treble, b.vocal,
        m.energy, m.centroid, m.spectral_flux, m.zero_crossing_rate, m.beat_pulse
    );
}
