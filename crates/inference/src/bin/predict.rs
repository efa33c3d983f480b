use clap::Parser;
use inference::SegmentationPredictor;
use models::FpnDbNetConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "predict", about = "Write a binary segmentation mask for an image")]
struct Args {
    /// Input image (png/jpeg).
    #[arg(long)]
    image: PathBuf,
    /// Output mask path (PNG).
    #[arg(long)]
    out: PathBuf,
    /// Checkpoint to load; untrained weights are used when missing.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Sigmoid threshold on the probability map.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let predictor = SegmentationPredictor::build(
        args.checkpoint.as_deref(),
        &FpnDbNetConfig::default(),
        args.threshold,
    )?;
    let image = image::open(&args.image)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", args.image.display()))?
        .to_rgb8();
    let mask = predictor.predict(&image);
    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    mask.save(&args.out)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", args.out.display()))?;
    let fg = mask.pixels().filter(|p| p[0] > 0).count();
    println!(
        "Wrote {} ({}x{}, {:.1}% foreground)",
        args.out.display(),
        mask.width(),
        mask.height(),
        100.0 * fg as f32 / (mask.width() * mask.height()).max(1) as f32
    );
    Ok(())
}
