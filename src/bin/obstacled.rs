//! obstacled - run the perception loop against a configured frame source
//!
//! This daemon:
//! 1. Loads configuration (`SEE_CONFIG` file, then `SEE_*` overrides)
//! 2. Builds the perception session (stub or ONNX backends)
//! 3. Feeds frames from the synthetic camera or a still image at the target fps
//! 4. Logs haptic commands and spoken summaries until Ctrl-C or `--seconds`

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use see_kernel::ingest::{SyntheticConfig, SyntheticSource};
use see_kernel::{LogActuator, LogVoice, PerceptionSession, Pipeline, RawFrame, Rotation, SeeConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Overrides SEE_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many seconds; runs until Ctrl-C when absent.
    #[arg(long)]
    seconds: Option<u64>,
    /// Frames per second; defaults to the configured source fps.
    #[arg(long)]
    fps: Option<u32>,
    /// Serve this still image instead of the synthetic camera.
    #[arg(long)]
    image: Option<PathBuf>,
}

enum Source {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-image")]
    Still(see_kernel::ingest::StillImageSource),
}

impl Source {
    fn open(cfg: &SeeConfig, image: Option<PathBuf>) -> Result<Self> {
        match image.or_else(|| cfg.source.image_path.clone()) {
            Some(path) => open_still(path),
            None => {
                let source = SyntheticSource::new(SyntheticConfig {
                    url: cfg.source.url.clone(),
                    width: cfg.source.width,
                    height: cfg.source.height,
                    fps: cfg.source.fps,
                    rotation: Rotation::from_degrees(cfg.source.rotation)?,
                    ..SyntheticConfig::default()
                })?;
                Ok(Source::Synthetic(source))
            }
        }
    }

    fn next_frame(&mut self) -> RawFrame {
        match self {
            Source::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-image")]
            Source::Still(source) => source.next_frame(),
        }
    }

    fn log_served(&self) {
        match self {
            Source::Synthetic(source) => {
                let stats = source.stats();
                log::info!("served {} frames from {}", stats.frames_captured, stats.url);
            }
            #[cfg(feature = "ingest-image")]
            Source::Still(source) => log::info!(
                "served {} frames of {}",
                source.frames_served(),
                source.path().display()
            ),
        }
    }
}

#[cfg(feature = "ingest-image")]
fn open_still(path: PathBuf) -> Result<Source> {
    Ok(Source::Still(see_kernel::ingest::StillImageSource::open(path)?))
}

#[cfg(not(feature = "ingest-image"))]
fn open_still(path: PathBuf) -> Result<Source> {
    Err(anyhow!(
        "still image {} requires the ingest-image feature",
        path.display()
    ))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => SeeConfig::load_from(path)?,
        None => SeeConfig::load()?,
    };
    let fps = args.fps.unwrap_or(cfg.source.fps);
    if fps == 0 {
        return Err(anyhow!("fps must be greater than zero"));
    }

    let mut source = Source::open(&cfg, args.image.clone())?;
    let session = PerceptionSession::from_config(
        &cfg,
        Box::new(LogActuator::default()),
        Box::new(LogVoice::default()),
    )?;
    if !session.has_depth() {
        log::warn!("running without depth estimation");
    }
    let pipeline = Pipeline::spawn(session)?;
    let sender = pipeline.sender();

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let frame_interval = Duration::from_secs(1) / fps;
    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    log::info!(
        "obstacled running at {} fps{}",
        fps,
        match args.seconds {
            Some(secs) => format!(" for {}s", secs),
            None => String::from(" (Ctrl-C to stop)"),
        }
    );

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if stop_rx.recv_timeout(frame_interval).is_ok() {
            log::info!("shutdown signal received");
            break;
        }
        if !sender.push(source.next_frame()) {
            break;
        }
    }

    let stats = pipeline.stop()?;
    source.log_served();
    println!(
        "frames={} dropped={} skipped={} haptic={} announced={} detector_busy={} depth_runs={}",
        stats.session.frames,
        stats.frames_dropped,
        stats.session.skipped,
        stats.session.haptic_issued,
        stats.session.announcements,
        stats.session.detection.busy_rejections,
        stats.session.depth.map(|d| d.inferences).unwrap_or(0)
    );
    Ok(())
}
