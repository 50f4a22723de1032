//! dms_analyze - find sustained phone usage in detection/pose streams

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use dms_kernel::export::{write_records, ExportFormat};
use dms_kernel::ingest::FrameReader;
use dms_kernel::{Analyzer, AnalyzerConfig, ConfigError, DetectionFrame, PoseFrame, RuleKind};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detection stream (JSON array, or JSON Lines with .jsonl/.ndjson).
    #[arg(long)]
    detections: PathBuf,
    /// Pose stream, same frame numbering as the detection stream.
    #[arg(long)]
    poses: PathBuf,
    /// Analyzer config file (.toml or .json). Defaults to $DMS_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Rule to run; repeat for several. Defaults to the config's default_rules.
    #[arg(long = "rule", value_name = "NAME")]
    rules: Vec<String>,
    /// Output format (table|csv|json).
    #[arg(long, default_value = "table")]
    format: String,
    /// Write results to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Frames per batch; overrides processing.batch_size.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Print run counters to stderr.
    #[arg(long)]
    stats: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let format = ExportFormat::from_name(&args.format).ok_or_else(|| {
        anyhow!(
            "unknown output format '{}' (expected table, csv or json)",
            args.format
        )
    })?;

    let cfg = {
        let _stage = ui.stage("Load config");
        match &args.config {
            Some(path) => AnalyzerConfig::load_from(Some(path.as_path()))?,
            None => AnalyzerConfig::load()?,
        }
    };
    let kinds = args
        .rules
        .iter()
        .map(|name| {
            RuleKind::from_name(name)
                .ok_or_else(|| anyhow::Error::new(ConfigError::UnknownRule(name.clone())))
        })
        .collect::<Result<Vec<_>>>()?;
    let analyzer = Analyzer::with_rules(&cfg, &kinds)?;
    let batch_size = args.batch_size.unwrap_or(cfg.batch_size);
    if batch_size == 0 {
        return Err(anyhow!("--batch-size must be >= 1"));
    }
    for rule in analyzer.rules() {
        let descriptor = rule.descriptor();
        log::info!(
            "rule {} reads {:?}",
            descriptor.id,
            descriptor.required_data
        );
    }

    let mut detections = FrameReader::<DetectionFrame>::open(&args.detections)?;
    let mut poses = FrameReader::<PoseFrame>::open(&args.poses)?;
    let report = {
        let mut stage = ui.frame_stage("Analyze frames");
        let mut session = analyzer.session();
        loop {
            let detection_batch = detections.next_batch(batch_size)?;
            let pose_batch = poses.next_batch(batch_size)?;
            if detection_batch.is_empty() && pose_batch.is_empty() {
                break;
            }
            stage.add_frames(detection_batch.len());
            session.push_batch(detection_batch, pose_batch);
        }
        session.finish()
    };

    let records = report.records();
    match &args.output {
        Some(path) => {
            let _stage = ui.stage("Write results");
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut out = std::io::BufWriter::new(file);
            write_records(&mut out, &records, format)?;
            out.flush()?;
            log::info!("{} violations written to {}", records.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write_records(&mut out, &records, format)?;
        }
    }

    if args.stats {
        let stats = &report.stats;
        eprintln!(
            "frames={} hits={} skipped_detections={} unmatched_frames={} dropped_pose_frames={}",
            stats.frames,
            stats.hits,
            stats.skipped_detections,
            stats.unmatched_frames,
            stats.dropped_pose_frames
        );
    }
    Ok(())
}
