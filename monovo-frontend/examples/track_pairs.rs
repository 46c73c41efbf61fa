//! Example: correspondences across a monocular image sequence
//!
//! Usage:
//!   cargo run --example track_pairs -- <image_dir> [--window 21] [--levels 0]
//!
//! Frames are processed in file-name order. Set RUST_LOG=debug for per-stage
//! timings.

use std::path::{Path, PathBuf};

use clap::Parser;
use monovo_frontend::{DetectorKind, FrontendConfig, Pipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the frames (png or jpg)
    image_dir: PathBuf,

    /// LK search window side length (odd)
    #[arg(long, default_value_t = 21)]
    window: u32,

    /// Extra pyramid levels for LK
    #[arg(long, default_value_t = 0)]
    levels: u32,

    /// FAST intensity threshold
    #[arg(long, default_value_t = 20)]
    threshold: u8,

    /// Keypoint budget per frame
    #[arg(long, default_value_t = 500)]
    max_features: usize,

    /// Stop after this many frames
    #[arg(long)]
    limit: Option<usize>,
}

fn frame_paths(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(
                        ext.to_ascii_lowercase().as_str(),
                        "png" | "jpg" | "jpeg"
                    )
                })
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut paths = frame_paths(&args.image_dir)?;
    if let Some(limit) = args.limit {
        paths.truncate(limit);
    }
    if paths.is_empty() {
        return Err(format!("no frames found in {}", args.image_dir.display()).into());
    }
    info!(frames = paths.len(), dir = %args.image_dir.display(), "found frames");

    let config = FrontendConfig::default()
        .with_detector(DetectorKind::Fast {
            threshold: args.threshold,
            grid_size: 16,
            max_features: args.max_features,
        })
        .with_window(args.window)
        .with_pyramid_levels(args.levels);
    let mut pipeline = Pipeline::from_config(&config);

    let mut total_pairs = 0usize;
    let mut skipped = 0usize;

    for (frame, path) in paths.iter().enumerate() {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(err) => {
                error!(path = %path.display(), %err, "could not read frame");
                skipped += 1;
                continue;
            }
        };

        match pipeline.process(frame as u64, &image) {
            Ok(outcome) => match outcome.pair {
                Some(pair) => {
                    total_pairs += pair.len();
                    info!(
                        frame,
                        keypoints = outcome.keypoints_detected,
                        correspondences = pair.len(),
                        "tracked"
                    );
                }
                None => info!(frame, keypoints = outcome.keypoints_detected, "reference frame"),
            },
            // Already logged by the pipeline
            Err(_) => skipped += 1,
        }
    }

    info!(
        frames = paths.len(),
        skipped,
        correspondences = total_pairs,
        "done"
    );
    Ok(())
}
