//! TOML run configuration. Every section is optional and falls back to its
//! defaults; CLI flags are applied on top by the binaries.

use models::FpnDbNetConfig;
use seg_dataset::{DatasetConfig, DatasetLayout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::learner::LearnerConfig;

pub const DEFAULT_CONFIG_NAME: &str = "ptrseg.toml";
pub const CONFIG_ENV: &str = "PTRSEG_CONFIG";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: FpnDbNetConfig,
    pub data: DataSection,
    pub train: LearnerConfig,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub root: PathBuf,
    /// Separate validation root; when unset `val_ratio` of `root` is held out.
    pub val_root: Option<PathBuf>,
    pub val_ratio: f32,
    pub layout: DatasetLayout,
    pub loader: DatasetConfig,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            val_root: None,
            val_ratio: 0.2,
            layout: DatasetLayout::default(),
            loader: DatasetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub checkpoint_dir: PathBuf,
    pub metrics_path: PathBuf,
    pub save_last: bool,
    /// Score watched for `best.bin` and early stopping.
    pub monitor: String,
    pub early_stop_threshold: Option<f32>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            metrics_path: PathBuf::from("logs/metrics.jsonl"),
            save_last: true,
            monitor: crate::metric::score_name(0),
            early_stop_threshold: None,
        }
    }
}

impl TrainConfig {
    /// `$PTRSEG_CONFIG` if set, else `ptrseg.toml` if present, else defaults.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_NAME);
        if default.exists() {
            return Self::from_path(default);
        }
        log::debug!("no {DEFAULT_CONFIG_NAME}; using built-in defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.model.validate()?;
        self.train.validate()?;
        if self.data.val_root.is_none() && !(0.0..1.0).contains(&self.data.val_ratio) {
            anyhow::bail!("val_ratio must be in [0, 1), got {}", self.data.val_ratio);
        }
        if let Some((w, h)) = self.data.loader.target_size {
            let multiple = self.model.backbone.stride_multiple() as u32;
            if w % multiple != 0 || h % multiple != 0 {
                anyhow::bail!(
                    "target_size {w}x{h} does not suit the {} backbone; both sides must be multiples of {multiple}",
                    self.model.backbone
                );
            }
        }
        Ok(())
    }
}
