//! Model records plus JSON sidecars describing how they were produced.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{FpnDbNet, FpnDbNetConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub model: FpnDbNetConfig,
    pub train_loss: f32,
    #[serde(default)]
    pub scores: BTreeMap<String, f32>,
    #[serde(default)]
    pub best_scores: BTreeMap<String, f32>,
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// Write `model` to `path` (`.bin`) and `meta` next to it (`.json`).
pub fn save_checkpoint<B: Backend>(
    model: &FpnDbNet<B>,
    meta: &CheckpointMeta,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;
    let sidecar = sidecar_path(path);
    fs::write(&sidecar, serde_json::to_string_pretty(meta)?)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", sidecar.display()))?;
    Ok(())
}

pub fn read_meta(path: &Path) -> anyhow::Result<CheckpointMeta> {
    let sidecar = sidecar_path(path);
    let text = fs::read_to_string(&sidecar)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", sidecar.display()))?;
    Ok(serde_json::from_str(&text)?)
}

/// Load a checkpoint into backend `B`.
///
/// The sidecar's model config wins over `fallback` when present, so records
/// always load into a matching architecture.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    fallback: &FpnDbNetConfig,
    device: &B::Device,
) -> anyhow::Result<(FpnDbNet<B>, Option<CheckpointMeta>)> {
    let meta = match read_meta(path) {
        Ok(meta) => Some(meta),
        Err(e) => {
            log::warn!("no usable sidecar for {} ({e}); using given model config", path.display());
            None
        }
    };
    let cfg = meta.as_ref().map(|m| &m.model).unwrap_or(fallback);
    let model = FpnDbNet::<B>::new(cfg, device)?
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
    Ok((model, meta))
}
