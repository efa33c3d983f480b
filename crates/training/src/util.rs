use burn::tensor::backend::Backend;
use clap::{Parser, ValueEnum};
use models::{BackboneKind, FpnDbNet};
use seg_dataset::{index_pairs, split_pairs, write_synthetic_dataset, BatchIter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::callbacks::{CheckpointCallback, EarlyStopping};
use crate::config::TrainConfig;
use crate::learner::{FitOutcome, Learner};
use crate::schedule::LrSchedule;
use crate::sink::{JsonlSink, LogSink};
use crate::ADBackend;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "train",
    about = "Train the FPN + DB segmentation network on image/mask pairs"
)]
pub struct TrainArgs {
    /// TOML config (defaults to $PTRSEG_CONFIG, then ptrseg.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    /// Dataset root containing images/ and masks/.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Separate validation root (otherwise a split of --data-root).
    #[arg(long)]
    pub val_root: Option<PathBuf>,
    /// Write N synthetic pairs into the data root before training.
    #[arg(long)]
    pub synthetic: Option<usize>,
    /// Backbone variant (small or large).
    #[arg(long)]
    pub backbone: Option<BackboneKind>,
    /// Fused feature width.
    #[arg(long)]
    pub hidden_dim: Option<usize>,
    /// Exclusive end epoch.
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Constant learning rate (replaces the configured schedule).
    #[arg(long)]
    pub lr: Option<f64>,
    /// Sigmoid threshold for predicted masks.
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Directory for last/best checkpoints.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Resume from a saved checkpoint (.bin with its .json sidecar).
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

impl TrainArgs {
    /// Load the config file and apply flag overrides.
    pub fn resolve(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_path(path)?,
            None => TrainConfig::load()?,
        };
        if let Some(root) = &self.data_root {
            cfg.data.root = root.clone();
        }
        if let Some(root) = &self.val_root {
            cfg.data.val_root = Some(root.clone());
        }
        if let Some(kind) = self.backbone {
            cfg.model.backbone = kind;
        }
        if let Some(hidden) = self.hidden_dim {
            cfg.model.hidden_dim = hidden;
        }
        if let Some(epochs) = self.epochs {
            cfg.train.epochs = epochs;
        }
        if let Some(bs) = self.batch_size {
            cfg.train.batch_size = bs;
        }
        if let Some(lr) = self.lr {
            cfg.train.schedule = LrSchedule::Constant { lr };
        }
        if let Some(t) = self.threshold {
            cfg.train.prob_threshold = t;
        }
        if let Some(dir) = &self.checkpoint_dir {
            cfg.output.checkpoint_dir = dir.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Train and validation iterators for `cfg.data`. Validation is `None` when
/// there is no validation root and `val_ratio` is zero.
pub fn build_loaders(cfg: &TrainConfig) -> anyhow::Result<(BatchIter, Option<BatchIter>)> {
    let data = &cfg.data;
    let train_idx = index_pairs(&data.root, &data.layout)?;
    let (train_idx, val_idx) = match &data.val_root {
        Some(val_root) => (train_idx, index_pairs(val_root, &data.layout)?),
        None => split_pairs(train_idx, data.val_ratio, data.loader.seed.unwrap_or(0)),
    };
    log::info!(
        "dataset: {} train / {} val pairs ({})",
        train_idx.len(),
        val_idx.len(),
        data.loader.describe()
    );
    let val = (!val_idx.is_empty())
        .then(|| BatchIter::from_indices(val_idx, data.loader.for_validation()));
    Ok((BatchIter::from_indices(train_idx, data.loader.clone()), val))
}

pub fn run_train(args: TrainArgs, interrupt: Arc<AtomicBool>) -> anyhow::Result<FitOutcome> {
    validate_backend_choice(args.backend.unwrap_or(BackendKind::NdArray))?;
    let cfg = args.resolve()?;

    if let Some(count) = args.synthetic {
        let size = cfg
            .data
            .loader
            .target_size
            .map(|(w, h)| w.max(h))
            .unwrap_or(112);
        write_synthetic_dataset(&cfg.data.root, &cfg.data.layout, count, size, 0)?;
        log::info!("wrote {count} synthetic pairs to {}", cfg.data.root.display());
    }

    let (mut train, mut val) = build_loaders(&cfg)?;
    let device = <ADBackend as Backend>::Device::default();

    let mut learner = Learner::<ADBackend>::new(cfg.train.clone(), device.clone())
        .with_sink(LogSink)
        .with_sink(JsonlSink::new(&cfg.output.metrics_path)?)
        .with_callback(
            CheckpointCallback::new(&cfg.output.checkpoint_dir, cfg.model.clone())
                .monitor(cfg.output.monitor.clone())
                .save_last(cfg.output.save_last),
        )
        .with_interrupt(interrupt);
    if let Some(threshold) = cfg.output.early_stop_threshold {
        learner = learner.with_callback(EarlyStopping::new(cfg.output.monitor.clone(), threshold));
    }

    let model = match &args.resume {
        Some(path) => learner.resume_from(path, &cfg.model)?,
        None => FpnDbNet::<ADBackend>::new(&cfg.model, &device)?,
    };

    let (_, outcome) = learner.fit(model, &mut train, val.as_mut())?;
    match outcome {
        FitOutcome::Completed => log::info!("training complete"),
        FitOutcome::Stopped { epoch } => log::info!("stopped early after epoch {epoch}"),
        FitOutcome::Interrupted { epoch } => log::warn!("interrupted during epoch {epoch}"),
    }
    log::info!("checkpoints in {}", cfg.output.checkpoint_dir.display());
    Ok(outcome)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            log::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[train]\nepochs = 3\nbatch_size = 4\n").unwrap();
        let args = TrainArgs {
            config: Some(path),
            batch_size: Some(2),
            lr: Some(1e-2),
            ..Default::default()
        };
        let cfg = args.resolve().unwrap();
        assert_eq!(cfg.train.epochs, 3);
        assert_eq!(cfg.train.batch_size, 2);
        assert_eq!(cfg.train.schedule, LrSchedule::Constant { lr: 1e-2 });
    }

    #[test]
    fn wgpu_requires_feature() {
        assert_eq!(
            validate_backend_choice(BackendKind::Wgpu).is_err(),
            !cfg!(feature = "backend-wgpu")
        );
        assert!(validate_backend_choice(BackendKind::NdArray).is_ok());
    }
}
