//! Jaccard (IoU) scoring and per-epoch score bookkeeping.

use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use std::collections::BTreeMap;

/// Upper bound on scores tracked per batch, matching the `Score 00..09` names.
pub const MAX_SCORES: usize = 10;

pub fn score_name(idx: usize) -> String {
    format!("Score {idx:02}")
}

pub fn best_name(name: &str) -> String {
    format!("Best {name}")
}

pub(crate) fn to_scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0)
}

/// Binary prediction `[N, H, W]` (0.0/1.0) from probability logits `[N, 1, H, W]`.
pub fn predict_mask<B: Backend>(prob: Tensor<B, 4>, threshold: f32) -> Tensor<B, 3> {
    let [n, _, h, w] = prob.dims();
    sigmoid(prob)
        .greater_elem(threshold)
        .float()
        .reshape([n, h, w])
}

/// Number of pixels above 0.5, summed as integers so large batches stay exact.
fn count_positive<B: Backend, const D: usize>(mask: Tensor<B, D>) -> u64 {
    let count: i64 = mask.greater_elem(0.5).int().sum().into_scalar().elem();
    count.max(0) as u64
}

/// Pixel counts of a binary prediction against a binary target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryConfusion {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tn: u64,
}

impl BinaryConfusion {
    pub fn from_tensors<B: Backend>(pred: Tensor<B, 3>, target: Tensor<B, 3>) -> Self {
        let total = pred.dims().iter().product::<usize>() as u64;
        let tp = count_positive(pred.clone() * target.clone());
        let fp = count_positive(pred) - tp;
        let fn_ = count_positive(target) - tp;
        Self {
            tp,
            fp,
            fn_,
            tn: total - tp - fp - fn_,
        }
    }

    /// IoU of the foreground class, `None` if it is absent from both.
    pub fn foreground_iou(&self) -> Option<f64> {
        iou(self.tp, self.fp, self.fn_)
    }

    /// IoU of the background class, `None` if it is absent from both.
    pub fn background_iou(&self) -> Option<f64> {
        iou(self.tn, self.fn_, self.fp)
    }

    /// Mean over both classes; a class absent from prediction and target
    /// scores 0.0.
    pub fn mean_iou(&self) -> f64 {
        let bg = self.background_iou().unwrap_or(0.0);
        let fg = self.foreground_iou().unwrap_or(0.0);
        (bg + fg) / 2.0
    }
}

fn iou(tp: u64, fp: u64, fn_: u64) -> Option<f64> {
    let union = tp + fp + fn_;
    (union > 0).then(|| tp as f64 / union as f64)
}

/// Two-class Jaccard index averaged over both classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardIndex;

impl JaccardIndex {
    pub fn compute<B: Backend>(&self, pred: Tensor<B, 3>, target: Tensor<B, 3>) -> f32 {
        BinaryConfusion::from_tensors(pred, target).mean_iou() as f32
    }
}

/// Averages per-batch score tuples into named epoch scores.
#[derive(Debug, Default, Clone)]
pub struct ScoreAccumulator {
    sums: Vec<f64>,
    batches: usize,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch. Empty tuples still count toward the batch total.
    pub fn push(&mut self, scores: &[f32]) {
        self.batches += 1;
        if scores.is_empty() {
            log::warn!("score is empty");
            return;
        }
        for (i, score) in scores.iter().take(MAX_SCORES).enumerate() {
            if self.sums.len() <= i {
                self.sums.resize(i + 1, 0.0);
            }
            self.sums[i] += *score as f64;
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Mean of every score slot over all recorded batches.
    pub fn finish(&self) -> BTreeMap<String, f32> {
        if self.batches == 0 {
            return BTreeMap::new();
        }
        self.sums
            .iter()
            .enumerate()
            .map(|(i, sum)| (score_name(i), (sum / self.batches as f64) as f32))
            .collect()
    }
}

/// Best score seen per metric across evaluation rounds.
///
/// Starts at zero for every metric and only moves on strict improvement.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BestScores {
    best: BTreeMap<String, f32>,
}

impl BestScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `scores` in; returns the `Best ...` names that improved.
    pub fn update(&mut self, scores: &BTreeMap<String, f32>) -> Vec<String> {
        let mut improved = Vec::new();
        for (name, score) in scores {
            let key = best_name(name);
            let best = self.best.get(&key).copied().unwrap_or(0.0);
            if *score > best {
                self.best.insert(key.clone(), *score);
                improved.push(key);
            }
        }
        improved
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.best.get(name).copied()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f32> {
        &self.best
    }

    pub fn reset(&mut self) {
        self.best.clear();
    }

    /// Restore from a checkpoint sidecar.
    pub fn extend(&mut self, saved: &BTreeMap<String, f32>) {
        for (k, v) in saved {
            self.best.insert(k.clone(), *v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type B = burn_ndarray::NdArray<f32>;

    fn mask(values: Vec<f32>) -> Tensor<B, 3> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [1, 1, n]), &Default::default())
    }

    #[test]
    fn perfect_prediction_scores_one() {
        let t = mask(vec![0.0, 1.0, 1.0, 0.0]);
        assert!((JaccardIndex.compute(t.clone(), t) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_prediction_has_zero_foreground_iou() {
        let c = BinaryConfusion::from_tensors(mask(vec![1.0, 0.0, 0.0]), mask(vec![0.0, 1.0, 0.0]));
        assert_eq!((c.tp, c.fp, c.fn_, c.tn), (0, 1, 1, 1));
        assert_eq!(c.foreground_iou(), Some(0.0));
        assert_eq!(c.background_iou(), Some(1.0 / 3.0));
        assert!((c.mean_iou() - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn absent_class_scores_zero_in_mean() {
        let t = mask(vec![0.0, 0.0]);
        let c = BinaryConfusion::from_tensors(t.clone(), t.clone());
        assert_eq!(c.foreground_iou(), None);
        assert_eq!(c.background_iou(), Some(1.0));
        assert_eq!(c.mean_iou(), 0.5);
        assert_eq!(JaccardIndex.compute(t.clone(), t), 0.5);
    }

    #[test]
    fn counts_stay_exact_past_f32_precision() {
        // 2^24 + 1 is not representable as f32.
        let n = (1usize << 24) + 1;
        let ones = Tensor::<B, 3>::ones([1, 1, n], &Default::default());
        let c = BinaryConfusion::from_tensors(ones.clone(), ones);
        assert_eq!(c.tp, n as u64);
        assert_eq!((c.fp, c.fn_, c.tn), (0, 0, 0));
    }

    #[test]
    fn predict_mask_thresholds_sigmoid() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::from_data(
            TensorData::new(vec![-3.0f32, -0.1, 0.1, 3.0], [1, 1, 2, 2]),
            &device,
        );
        let pred = predict_mask(logits.clone(), 0.5);
        assert_eq!(pred.dims(), [1, 2, 2]);
        assert_eq!(pred.into_data().to_vec::<f32>().unwrap(), vec![0.0, 0.0, 1.0, 1.0]);
        // Any negative threshold marks every pixel as foreground.
        let all = predict_mask(logits, -0.5);
        assert_eq!(all.into_data().to_vec::<f32>().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn accumulator_averages_over_all_batches() {
        let mut acc = ScoreAccumulator::new();
        acc.push(&[0.5]);
        acc.push(&[]);
        acc.push(&[1.0, 0.25]);
        assert_eq!(acc.batches(), 3);
        let scores = acc.finish();
        assert!((scores["Score 00"] - 0.5).abs() < 1e-6);
        assert!((scores["Score 01"] - 0.25 / 3.0).abs() < 1e-6);
        assert!(ScoreAccumulator::new().finish().is_empty());
    }

    #[test]
    fn best_scores_only_increase() {
        let mut best = BestScores::new();
        let round = |v: f32| BTreeMap::from([(score_name(0), v)]);
        assert_eq!(best.update(&round(0.4)), vec!["Best Score 00".to_string()]);
        assert!(best.update(&round(0.3)).is_empty());
        assert_eq!(best.get("Best Score 00"), Some(0.4));
        best.update(&round(0.6));
        assert_eq!(best.get("Best Score 00"), Some(0.6));
        // Zero never beats the implicit starting value.
        best.reset();
        assert!(best.update(&round(0.0)).is_empty());
        assert!(best.as_map().is_empty());
    }
}
