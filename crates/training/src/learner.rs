//! Explicit epoch loop: train, validate, score, then run callbacks.

use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use models::{FpnDbNet, FpnDbNetConfig};
use seg_dataset::BatchIter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::callbacks::{Callback, Control, EpochReport};
use crate::checkpoint::load_checkpoint;
use crate::loss::SegmentationLoss;
use crate::metric::{predict_mask, to_scalar, BestScores, JaccardIndex, ScoreAccumulator};
use crate::schedule::LrSchedule;
use crate::sink::MetricSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Exclusive end epoch.
    pub epochs: usize,
    pub start_epoch: usize,
    pub batch_size: usize,
    /// Log the running loss every N training batches.
    pub log_every: usize,
    /// Sigmoid cutoff for turning probability logits into a mask.
    pub prob_threshold: f32,
    pub loss: SegmentationLoss,
    pub schedule: LrSchedule,
    pub weight_decay: f32,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            start_epoch: 0,
            batch_size: 8,
            log_every: 100,
            prob_threshold: 0.5,
            loss: SegmentationLoss::default(),
            schedule: LrSchedule::default(),
            weight_decay: 1e-4,
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.start_epoch > self.epochs {
            anyhow::bail!(
                "start_epoch {} is past the final epoch {}",
                self.start_epoch,
                self.epochs
            );
        }
        self.loss.validate()?;
        self.schedule.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    Completed,
    /// A callback asked to stop after this epoch.
    Stopped { epoch: usize },
    /// The interrupt flag was raised during this epoch.
    Interrupted { epoch: usize },
}

/// Validation results for one pass over a batch iterator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub scores: BTreeMap<String, f32>,
    pub batches: usize,
}

pub struct Learner<B: AutodiffBackend> {
    config: LearnerConfig,
    device: B::Device,
    best: BestScores,
    sinks: Vec<Box<dyn MetricSink>>,
    callbacks: Vec<Box<dyn Callback<B>>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<B: AutodiffBackend> Learner<B> {
    pub fn new(config: LearnerConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            best: BestScores::new(),
            sinks: Vec::new(),
            callbacks: Vec::new(),
            interrupt: None,
        }
    }

    pub fn with_sink(mut self, sink: impl MetricSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn with_callback(mut self, callback: impl Callback<B> + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn best_scores(&self) -> &BestScores {
        &self.best
    }

    /// Load weights from `path` and continue after the epoch it recorded.
    pub fn resume_from(
        &mut self,
        path: &Path,
        fallback: &FpnDbNetConfig,
    ) -> anyhow::Result<FpnDbNet<B>> {
        let (model, meta) = load_checkpoint::<B>(path, fallback, &self.device)?;
        match meta {
            Some(meta) => {
                self.config.start_epoch = meta.epoch + 1;
                self.best.extend(&meta.best_scores);
                log::info!(
                    "resumed from {} at epoch {}",
                    path.display(),
                    self.config.start_epoch
                );
            }
            None => log::warn!(
                "{} has no sidecar; starting at epoch {}",
                path.display(),
                self.config.start_epoch
            ),
        }
        Ok(model)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn emit(&mut self, epoch: usize, metrics: &BTreeMap<String, f32>) -> anyhow::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.emit(epoch, metrics)?;
        }
        Ok(())
    }

    pub fn fit(
        &mut self,
        mut model: FpnDbNet<B>,
        train: &mut BatchIter,
        mut val: Option<&mut BatchIter>,
    ) -> anyhow::Result<(FpnDbNet<B>, FitOutcome)> {
        self.config.validate()?;
        let mut optim = AdamWConfig::new()
            .with_weight_decay(self.config.weight_decay)
            .init::<B, FpnDbNet<B>>();
        let batch_size = self.config.batch_size;
        let threshold = self.config.prob_threshold;

        for cb in self.callbacks.iter_mut() {
            cb.on_fit_start(self.config.start_epoch)?;
        }

        let mut outcome = FitOutcome::Completed;
        'epochs: for epoch in self.config.start_epoch..self.config.epochs {
            let lr = self.config.schedule.lr(epoch);
            log::info!("Epoch {epoch}");
            log::info!("Learning rate: {lr:.3e}");

            train.reset();
            let total = train.num_batches(batch_size);
            let mut losses = Vec::with_capacity(total);
            let mut train_scores = ScoreAccumulator::new();
            while let Some(batch) = train.next_batch::<B>(batch_size, &self.device)? {
                if self.interrupted() {
                    outcome = FitOutcome::Interrupted { epoch };
                    break 'epochs;
                }
                check_batch_sides(batch.images.dims(), model.stride_multiple())?;
                let output = model.forward(batch.images);
                let loss = self.config.loss.forward(&output, batch.masks.clone());
                let loss_val = to_scalar(loss.clone().detach());
                let pred = predict_mask(output.prob.detach(), threshold);
                train_scores.push(&[JaccardIndex.compute(pred, batch.masks)]);

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);

                losses.push(loss_val);
                if losses.len() % self.config.log_every.max(1) == 0 {
                    log::info!("Loss: {loss_val:.4} [{}/{total}]", losses.len());
                }
            }
            let train_loss = mean(&losses);
            log::info!("Train loss: {train_loss:.4}");

            let mut metrics = BTreeMap::from([("Train loss".to_string(), train_loss)]);
            for (name, value) in train_scores.finish() {
                metrics.insert(format!("Train {name}"), value);
            }

            let mut scores = BTreeMap::new();
            let mut improved = Vec::new();
            if let Some(val) = val.as_deref_mut() {
                let eval = evaluate(
                    &model.valid(),
                    val,
                    &self.config.loss,
                    threshold,
                    batch_size,
                    &self.device,
                )?;
                metrics.insert("Valid loss".to_string(), eval.loss);
                improved = self.best.update(&eval.scores);
                metrics.extend(eval.scores.clone());
                metrics.extend(self.best.as_map().clone());
                scores = eval.scores;
            }
            self.emit(epoch, &metrics)?;

            let report = EpochReport {
                epoch,
                lr,
                train_loss,
                scores,
                best_scores: self.best.as_map().clone(),
                improved,
            };
            let mut stop = false;
            for cb in self.callbacks.iter_mut() {
                if cb.on_epoch_end(&report, &model)? == Control::Stop {
                    stop = true;
                }
            }
            if stop {
                outcome = FitOutcome::Stopped { epoch };
                break;
            }
        }

        for cb in self.callbacks.iter_mut() {
            cb.on_fit_end(&model)?;
        }
        Ok((model, outcome))
    }
}

/// Error out before the pyramid's shape assertion can fire.
fn check_batch_sides(dims: [usize; 4], multiple: usize) -> anyhow::Result<()> {
    let [_, _, h, w] = dims;
    if h % multiple != 0 || w % multiple != 0 {
        anyhow::bail!(
            "batch images are {w}x{h}; this backbone needs sides that are multiples of {multiple} (set data.loader.target_size)"
        );
    }
    Ok(())
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// One pass over `iter` without gradients: mean loss and averaged Jaccard
/// scores (`Score 00`).
pub fn evaluate<B: Backend>(
    model: &FpnDbNet<B>,
    iter: &mut BatchIter,
    loss_fn: &SegmentationLoss,
    threshold: f32,
    batch_size: usize,
    device: &B::Device,
) -> anyhow::Result<Evaluation> {
    iter.reset();
    let mut losses = Vec::new();
    let mut scores = ScoreAccumulator::new();
    while let Some(batch) = iter.next_batch::<B>(batch_size, device)? {
        check_batch_sides(batch.images.dims(), model.stride_multiple())?;
        let output = model.forward(batch.images);
        losses.push(to_scalar(loss_fn.forward(&output, batch.masks.clone())));
        let pred = predict_mask(output.prob, threshold);
        scores.push(&[JaccardIndex.compute(pred, batch.masks)]);
    }
    Ok(Evaluation {
        loss: mean(&losses),
        scores: scores.finish(),
        batches: scores.batches(),
    })
}
