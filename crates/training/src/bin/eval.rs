use burn::tensor::backend::Backend;
use clap::Parser;
use models::FpnDbNetConfig;
use seg_dataset::BatchIter;
use std::path::PathBuf;
use training::util::{validate_backend_choice, BackendKind};
use training::{evaluate, load_checkpoint, TrainBackend, TrainConfig};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a segmentation checkpoint on a dataset (loss and Jaccard index)"
)]
struct Args {
    /// Checkpoint to load (.bin, with optional .json sidecar).
    #[arg(long)]
    checkpoint: PathBuf,
    /// Dataset root containing images/ and masks/ (defaults to the config's data root).
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// TOML config (defaults to $PTRSEG_CONFIG, then ptrseg.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    #[arg(long, default_value_t = 8)]
    batch_size: usize,
    /// Sigmoid threshold for predicted masks (overrides the config).
    #[arg(long)]
    threshold: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let cfg = match &args.config {
        Some(path) => TrainConfig::from_path(path)?,
        None => TrainConfig::load()?,
    };
    let root = args.data_root.clone().unwrap_or_else(|| cfg.data.root.clone());
    let mut iter = BatchIter::from_root(&root, &cfg.data.layout, cfg.data.loader.for_validation())?;

    let device = <TrainBackend as Backend>::Device::default();
    let fallback: FpnDbNetConfig = cfg.model.clone();
    let (model, meta) = load_checkpoint::<TrainBackend>(&args.checkpoint, &fallback, &device)?;
    if let Some(meta) = &meta {
        log::info!("checkpoint from epoch {} (train loss {:.4})", meta.epoch, meta.train_loss);
    }

    let threshold = args.threshold.unwrap_or(cfg.train.prob_threshold);
    let eval = evaluate(
        &model,
        &mut iter,
        &cfg.train.loss,
        threshold,
        args.batch_size.max(1),
        &device,
    )?;
    let jaccard = eval.scores.values().next().copied().unwrap_or(0.0);
    println!(
        "Eval complete: loss={:.4}, jaccard={:.4} ({} samples, {} batches, threshold={})",
        eval.loss,
        jaccard,
        iter.len(),
        eval.batches,
        threshold
    );
    Ok(())
}
