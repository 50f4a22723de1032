//! dms_frame - print the detections and poses of one frame as JSON
//!
//! Renderers use this to draw a single-frame overlay for a violation. The
//! frame shown is the first one at or after `--timestamp-ms`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use dms_kernel::ingest::read_frames;
use dms_kernel::{AnalyzerConfig, DetectionFrame, FrameStore, PoseFrame, PoseSequencer, TrackingMode};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detection stream (JSON array or JSON Lines).
    #[arg(long)]
    detections: PathBuf,
    /// Pose stream (JSON array or JSON Lines).
    #[arg(long)]
    poses: PathBuf,
    /// Video position in milliseconds.
    #[arg(long)]
    timestamp_ms: f64,
    /// Analyzer config; when given, person ids go through its tracking mode
    /// so they match `dms_analyze` output.
    #[arg(long, env = "DMS_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if !args.timestamp_ms.is_finite() || args.timestamp_ms < 0.0 {
        return Err(anyhow!("--timestamp-ms must be a non-negative number"));
    }

    let detections: Vec<DetectionFrame> = read_frames(&args.detections)?;
    let poses: Vec<PoseFrame> = read_frames(&args.poses)?;
    let tracking = match &args.config {
        Some(path) => AnalyzerConfig::load_from(Some(path.as_path()))?.tracking,
        None => TrackingMode::PassThrough,
    };
    let mut sequencer = PoseSequencer::new(tracking);
    let poses = sequencer.accept_batch(poses);
    if sequencer.dropped() > 0 {
        log::warn!("{} repeated or out-of-order pose frames dropped", sequencer.dropped());
    }

    let store = FrameStore::new(detections, poses);
    let overlay = store.overlay_at(args.timestamp_ms).ok_or_else(|| {
        anyhow!(
            "no frame at or after {}ms ({} frames loaded)",
            args.timestamp_ms,
            store.detections().len()
        )
    })?;
    println!("{}", serde_json::to_string_pretty(&overlay)?);
    Ok(())
}
