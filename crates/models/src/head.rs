//! Differentiable-binarization head: two independent upsampling decoders
//! producing a probability map and a threshold map (both logits).

use burn::module::Module;
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbHeadConfig {
    pub hidden_dim: usize,
    /// Additional mid-width ×2 stages between the two mandatory ones.
    #[serde(default)]
    pub extra_stages: usize,
}

impl DbHeadConfig {
    pub fn new(hidden_dim: usize) -> Self {
        Self {
            hidden_dim,
            extra_stages: 0,
        }
    }

    pub fn with_extra_stages(mut self, extra_stages: usize) -> Self {
        self.extra_stages = extra_stages;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.hidden_dim < 4 || self.hidden_dim % 4 != 0 {
            return Err(ModelError::IndivisibleHidden {
                hidden_dim: self.hidden_dim,
            });
        }
        Ok(())
    }

    /// Total spatial upscale applied by each branch.
    pub fn upscale(&self) -> usize {
        1 << (2 + self.extra_stages)
    }
}

/// Probability/threshold logits, each `[batch, 1, H, W]`.
#[derive(Debug, Clone)]
pub struct DbOutput<B: Backend> {
    pub prob: Tensor<B, 4>,
    pub thres: Tensor<B, 4>,
}

#[derive(Debug, Module)]
pub struct UpStage<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> UpStage<B> {
    fn new(c_in: usize, c_out: usize, device: &B::Device) -> Self {
        Self {
            deconv: ConvTranspose2dConfig::new([c_in, c_out], [2, 2])
                .with_stride([2, 2])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(c_out).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.deconv.forward(x)))
    }
}

#[derive(Debug, Module)]
pub struct DbBranch<B: Backend> {
    stages: Vec<UpStage<B>>,
    out: ConvTranspose2d<B>,
}

impl<B: Backend> DbBranch<B> {
    fn new(cfg: &DbHeadConfig, device: &B::Device) -> Self {
        let mid = cfg.hidden_dim / 4;
        let mut stages = vec![UpStage::new(cfg.hidden_dim, mid, device)];
        for _ in 0..cfg.extra_stages {
            stages.push(UpStage::new(mid, mid, device));
        }
        let out = ConvTranspose2dConfig::new([mid, 1], [2, 2])
            .with_stride([2, 2])
            .init(device);
        Self { stages, out }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .stages
            .iter()
            .fold(x, |x, stage| stage.forward(x));
        self.out.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct DbHead<B: Backend> {
    prob_head: DbBranch<B>,
    thres_head: DbBranch<B>,
    hidden_dim: usize,
    upscale: usize,
}

impl<B: Backend> DbHead<B> {
    pub fn new(cfg: &DbHeadConfig, device: &B::Device) -> ModelResult<Self> {
        cfg.validate()?;
        Ok(Self {
            prob_head: DbBranch::new(cfg, device),
            thres_head: DbBranch::new(cfg, device),
            hidden_dim: cfg.hidden_dim,
            upscale: cfg.upscale(),
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn upscale(&self) -> usize {
        self.upscale
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> DbOutput<B> {
        let prob = self.prob_head.forward(x.clone());
        let thres = self.thres_head.forward(x);
        DbOutput { prob, thres }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn_ndarray::NdArray<f32>;

    #[test]
    fn rejects_hidden_not_divisible_by_four() {
        assert!(DbHeadConfig::new(255).validate().is_err());
        assert!(DbHeadConfig::new(256).validate().is_ok());
    }

    #[test]
    fn extra_stage_doubles_upscale() {
        assert_eq!(DbHeadConfig::new(16).upscale(), 4);
        assert_eq!(DbHeadConfig::new(16).with_extra_stages(1).upscale(), 8);

        let device = Default::default();
        let head = DbHead::<B>::new(&DbHeadConfig::new(16).with_extra_stages(1), &device).unwrap();
        let out = head.forward(Tensor::zeros([1, 16, 3, 5], &device));
        assert_eq!(out.prob.dims(), [1, 1, 24, 40]);
    }

    #[test]
    fn branches_hold_independent_weights() {
        let device = Default::default();
        let head = DbHead::<B>::new(&DbHeadConfig::new(16), &device).unwrap();
        let x = Tensor::<B, 4>::random(
            [1, 16, 4, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let out = head.forward(x);
        let prob = out.prob.into_data().to_vec::<f32>().unwrap();
        let thres = out.thres.into_data().to_vec::<f32>().unwrap();
        assert_ne!(prob, thres);
    }
}
