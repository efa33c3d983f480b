//! Class-weighted two-class cross entropy over the DB head outputs.

use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::DbOutput;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationLoss {
    /// Weights for class 0 (background, threshold channel) and class 1
    /// (foreground, probability channel).
    pub class_weights: [f32; 2],
}

impl Default for SegmentationLoss {
    fn default() -> Self {
        // Foreground pixels are rare; down-weight the background.
        Self {
            class_weights: [0.1, 1.0],
        }
    }
}

impl SegmentationLoss {
    pub fn new(class_weights: [f32; 2]) -> Self {
        Self { class_weights }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let [w0, w1] = self.class_weights;
        if !(w0.is_finite() && w1.is_finite()) || w0 < 0.0 || w1 < 0.0 || w0 + w1 <= 0.0 {
            anyhow::bail!(
                "class weights must be finite, non-negative and not both zero: {:?}",
                self.class_weights
            );
        }
        Ok(())
    }

    /// Two-class logits `[N, 2, H, W]`: threshold map as class 0, probability
    /// map as class 1.
    pub fn logits<B: Backend>(output: &DbOutput<B>) -> Tensor<B, 4> {
        Tensor::cat(vec![output.thres.clone(), output.prob.clone()], 1)
    }

    pub fn forward<B: Backend>(&self, output: &DbOutput<B>, masks: Tensor<B, 3>) -> Tensor<B, 1> {
        self.forward_logits(Self::logits(output), masks)
    }

    /// Weighted mean negative log-likelihood, `sum(w_i * nll_i) / sum(w_i)`.
    ///
    /// `masks` is `[N, H, W]` with values in {0, 1}.
    pub fn forward_logits<B: Backend>(&self, logits: Tensor<B, 4>, masks: Tensor<B, 3>) -> Tensor<B, 1> {
        let [n, c, h, w] = logits.dims();
        assert_eq!(c, 2, "segmentation loss expects 2 classes, got {c}");
        let [w0, w1] = self.class_weights;

        let target: Tensor<B, 4> = masks.unsqueeze_dim(1);
        let background = target.clone().neg().add_scalar(1.0);
        let log_probs = log_softmax(logits, 1);
        let lp_bg = log_probs.clone().slice([0..n, 0..1, 0..h, 0..w]);
        let lp_fg = log_probs.slice([0..n, 1..2, 0..h, 0..w]);

        let nll = -(target.clone() * lp_fg + background * lp_bg);
        let weights = target.mul_scalar(w1 - w0).add_scalar(w0);
        (nll * weights.clone()).sum() / weights.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};

    type B = burn_ndarray::NdArray<f32>;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn loss_is_non_negative_for_random_logits() {
        let device = Default::default();
        let loss = SegmentationLoss::default();
        for seed_scale in [0.1f64, 1.0, 10.0, 100.0] {
            let logits = Tensor::<B, 4>::random(
                [2, 2, 6, 5],
                Distribution::Normal(0.0, seed_scale),
                &device,
            );
            let masks = Tensor::<B, 3>::random([2, 6, 5], Distribution::Bernoulli(0.3), &device);
            let value = scalar(loss.forward_logits(logits, masks));
            assert!(value.is_finite());
            assert!(value >= 0.0, "loss {value} < 0 at scale {seed_scale}");
        }
    }

    #[test]
    fn equal_logits_give_ln_two() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::zeros([1, 2, 2, 2], &device);
        let masks = Tensor::<B, 3>::from_data(
            TensorData::new(vec![0.0f32, 1.0, 1.0, 0.0], [1, 2, 2]),
            &device,
        );
        let value = scalar(SegmentationLoss::default().forward_logits(logits, masks));
        assert!((value - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn weights_scale_background_contribution() {
        let device = Default::default();
        // Pixel 0 is background predicted as foreground, pixel 1 is a
        // confident correct foreground.
        let logits = Tensor::<B, 4>::from_data(
            TensorData::new(vec![0.0f32, 0.0, 4.0, 10.0], [1, 2, 1, 2]),
            &device,
        );
        let masks =
            Tensor::<B, 3>::from_data(TensorData::new(vec![0.0f32, 1.0], [1, 1, 2]), &device);
        let weighted = scalar(SegmentationLoss::default().forward_logits(logits.clone(), masks.clone()));
        let uniform = scalar(SegmentationLoss::new([1.0, 1.0]).forward_logits(logits, masks));
        assert!(weighted < uniform);
    }

    #[test]
    fn thres_is_class_zero() {
        let device = Default::default();
        let output = DbOutput {
            prob: Tensor::<B, 4>::ones([1, 1, 2, 2], &device),
            thres: Tensor::<B, 4>::zeros([1, 1, 2, 2], &device),
        };
        let logits = SegmentationLoss::logits(&output);
        let v = logits.into_data().to_vec::<f32>().unwrap();
        assert_eq!(v, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn rejects_bad_weights() {
        assert!(SegmentationLoss::new([0.0, 0.0]).validate().is_err());
        assert!(SegmentationLoss::new([-1.0, 1.0]).validate().is_err());
        assert!(SegmentationLoss::default().validate().is_ok());
    }
}
