//! Hooks run by the [`Learner`](crate::Learner) around each epoch.

use burn::tensor::backend::Backend;
use models::{FpnDbNet, FpnDbNetConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::checkpoint::{save_checkpoint, CheckpointMeta};
use crate::metric::{best_name, score_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Summary of one finished epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub lr: f64,
    pub train_loss: f32,
    /// Validation scores (`Score 00`, ...). Empty without a validation set.
    pub scores: BTreeMap<String, f32>,
    pub best_scores: BTreeMap<String, f32>,
    /// `Best ...` names that improved this epoch.
    pub improved: Vec<String>,
}

pub trait Callback<B: Backend> {
    fn on_fit_start(&mut self, _start_epoch: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _report: &EpochReport,
        _model: &FpnDbNet<B>,
    ) -> anyhow::Result<Control> {
        Ok(Control::Continue)
    }

    fn on_fit_end(&mut self, _model: &FpnDbNet<B>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Saves `last.bin` every epoch and `best.bin` whenever the monitored score
/// improves.
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    dir: PathBuf,
    monitor: String,
    save_last: bool,
    model_cfg: FpnDbNetConfig,
}

impl CheckpointCallback {
    pub fn new(dir: impl Into<PathBuf>, model_cfg: FpnDbNetConfig) -> Self {
        Self {
            dir: dir.into(),
            monitor: score_name(0),
            save_last: true,
            model_cfg,
        }
    }

    pub fn monitor(mut self, name: impl Into<String>) -> Self {
        self.monitor = name.into();
        self
    }

    pub fn save_last(mut self, save_last: bool) -> Self {
        self.save_last = save_last;
        self
    }

    pub fn last_path(&self) -> PathBuf {
        self.dir.join("last.bin")
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join("best.bin")
    }

    fn meta(&self, report: &EpochReport) -> CheckpointMeta {
        CheckpointMeta {
            epoch: report.epoch,
            model: self.model_cfg.clone(),
            train_loss: report.train_loss,
            scores: report.scores.clone(),
            best_scores: report.best_scores.clone(),
        }
    }
}

impl<B: Backend> Callback<B> for CheckpointCallback {
    fn on_epoch_end(
        &mut self,
        report: &EpochReport,
        model: &FpnDbNet<B>,
    ) -> anyhow::Result<Control> {
        let meta = self.meta(report);
        if self.save_last {
            save_checkpoint(model, &meta, &self.last_path())?;
        }
        if report.improved.contains(&best_name(&self.monitor)) {
            let path = self.best_path();
            save_checkpoint(model, &meta, &path)?;
            log::info!(
                "{} improved to {:.4}; saved {}",
                self.monitor,
                report.scores.get(&self.monitor).copied().unwrap_or_default(),
                path.display()
            );
        }
        Ok(Control::Continue)
    }
}

/// Stops training once a monitored validation score exceeds `threshold`.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: String,
    threshold: f32,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, threshold: f32) -> Self {
        Self {
            monitor: monitor.into(),
            threshold,
        }
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(score_name(0), 0.99)
    }
}

impl<B: Backend> Callback<B> for EarlyStopping {
    fn on_epoch_end(
        &mut self,
        report: &EpochReport,
        _model: &FpnDbNet<B>,
    ) -> anyhow::Result<Control> {
        match report.scores.get(&self.monitor) {
            Some(score) if *score > self.threshold => {
                log::info!(
                    "{} = {score:.4} exceeds {:.4}; stopping",
                    self.monitor,
                    self.threshold
                );
                Ok(Control::Stop)
            }
            _ => Ok(Control::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn_ndarray::NdArray<f32>;

    fn report(score: f32, improved: bool) -> EpochReport {
        EpochReport {
            epoch: 0,
            lr: 1e-3,
            train_loss: 0.3,
            scores: BTreeMap::from([(score_name(0), score)]),
            best_scores: BTreeMap::from([(best_name(&score_name(0)), score)]),
            improved: if improved {
                vec![best_name(&score_name(0))]
            } else {
                Vec::new()
            },
        }
    }

    fn tiny_cfg() -> FpnDbNetConfig {
        FpnDbNetConfig {
            hidden_dim: 12,
            ..Default::default()
        }
    }

    #[test]
    fn early_stopping_triggers_above_threshold() {
        let device = Default::default();
        let model = FpnDbNet::<B>::new(&tiny_cfg(), &device).unwrap();
        let mut cb = EarlyStopping::default();
        let below = Callback::<B>::on_epoch_end(&mut cb, &report(0.5, true), &model).unwrap();
        let above = Callback::<B>::on_epoch_end(&mut cb, &report(0.995, true), &model).unwrap();
        assert_eq!(below, Control::Continue);
        assert_eq!(above, Control::Stop);
    }

    #[test]
    fn best_checkpoint_written_only_on_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = FpnDbNet::<B>::new(&tiny_cfg(), &device).unwrap();
        let mut cb = CheckpointCallback::new(dir.path(), tiny_cfg());

        Callback::<B>::on_epoch_end(&mut cb, &report(0.2, false), &model).unwrap();
        assert!(cb.last_path().exists());
        assert!(dir.path().join("last.json").exists());
        assert!(!cb.best_path().exists());

        Callback::<B>::on_epoch_end(&mut cb, &report(0.4, true), &model).unwrap();
        assert!(cb.best_path().exists());
        let meta = crate::checkpoint::read_meta(&cb.best_path()).unwrap();
        assert_eq!(meta.model, tiny_cfg());
        assert_eq!(meta.scores[&score_name(0)], 0.4);
    }
}
