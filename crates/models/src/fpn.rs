//! Feature pyramid fusion.
//!
//! Projects every backbone level to a common width, fuses top-down by
//! upsample-and-add, then re-projects each level to `out_channels / N`,
//! upsamples it back to the shallowest resolution and concatenates.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::blocks::{upsample_bilinear, ConvBnRelu};
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePyramidConfig {
    /// Channel count per input level, shallow to deep.
    pub in_channels: Vec<usize>,
    /// Total output width after concatenation.
    pub out_channels: usize,
}

impl FeaturePyramidConfig {
    pub fn new(in_channels: Vec<usize>, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        let levels = self.in_channels.len();
        if levels == 0 {
            return Err(ModelError::NoLevels);
        }
        if self.out_channels % levels != 0 {
            return Err(ModelError::IndivisibleWidth {
                out_channels: self.out_channels,
                levels,
            });
        }
        Ok(())
    }

    /// Width of a single level after the output projection.
    pub fn branch_channels(&self) -> usize {
        self.out_channels / self.in_channels.len().max(1)
    }
}

#[derive(Debug, Module)]
pub struct FeaturePyramid<B: Backend> {
    in_branches: Vec<ConvBnRelu<B>>,
    out_branches: Vec<ConvBnRelu<B>>,
    out_channels: usize,
}

impl<B: Backend> FeaturePyramid<B> {
    pub fn new(cfg: &FeaturePyramidConfig, device: &B::Device) -> ModelResult<Self> {
        cfg.validate()?;
        let branch = cfg.branch_channels();
        let in_branches = cfg
            .in_channels
            .iter()
            .map(|&chans| ConvBnRelu::new(chans, cfg.out_channels, 1, 1, device))
            .collect();
        let out_branches = cfg
            .in_channels
            .iter()
            .map(|_| ConvBnRelu::new(cfg.out_channels, branch, 3, 1, device))
            .collect();
        Ok(Self {
            in_branches,
            out_branches,
            out_channels: cfg.out_channels,
        })
    }

    pub fn num_branches(&self) -> usize {
        self.out_branches.len()
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Fuse `features` (shallow to deep) into `[batch, out_channels, H0, W0]`.
    ///
    /// # Panics
    /// When `features.len()` differs from the configured number of levels.
    pub fn forward(&self, features: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        assert_eq!(
            features.len(),
            self.num_branches(),
            "feature pyramid expects {} levels, got {}",
            self.num_branches(),
            features.len()
        );

        let projected: Vec<Tensor<B, 4>> = self
            .in_branches
            .iter()
            .zip(features)
            .map(|(branch, x)| branch.forward(x))
            .collect();

        let fused = top_down(projected);

        let levels: Vec<Tensor<B, 4>> = self
            .out_branches
            .iter()
            .zip(fused)
            .enumerate()
            .map(|(idx, (branch, x))| upsample_bilinear(branch.forward(x), 1 << idx))
            .collect();

        Tensor::cat(levels, 1)
    }
}

/// Top-down pathway: every level becomes itself plus the ×2-upsampled fused
/// level below it. Input and output are both ordered shallow to deep.
///
/// # Panics
/// When a level is not exactly twice the spatial size of the next deeper one.
pub fn top_down<B: Backend>(projected: Vec<Tensor<B, 4>>) -> Vec<Tensor<B, 4>> {
    let mut rev = projected.into_iter().rev();
    let Some(deepest) = rev.next() else {
        return Vec::new();
    };
    let mut out = vec![deepest.clone()];
    let mut prev = deepest;
    for shallower in rev {
        let up = upsample_bilinear(prev, 2);
        assert_eq!(
            up.dims(),
            shallower.dims(),
            "pyramid levels must halve in size at each step"
        );
        prev = up + shallower;
        out.push(prev.clone());
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn_ndarray::NdArray<f32>;

    #[test]
    fn rejects_indivisible_width() {
        let cfg = FeaturePyramidConfig::new(vec![8, 16, 32], 64);
        assert_eq!(
            cfg.validate(),
            Err(ModelError::IndivisibleWidth {
                out_channels: 64,
                levels: 3
            })
        );
    }

    #[test]
    fn rejects_empty_levels() {
        let cfg = FeaturePyramidConfig::new(Vec::new(), 64);
        assert_eq!(cfg.validate(), Err(ModelError::NoLevels));
    }

    #[test]
    fn top_down_accumulates_deeper_levels() {
        let device = Default::default();
        let levels = vec![
            Tensor::<B, 4>::zeros([1, 2, 8, 8], &device),
            Tensor::<B, 4>::zeros([1, 2, 4, 4], &device),
            Tensor::<B, 4>::ones([1, 2, 2, 2], &device),
        ];
        let fused = top_down(levels);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].dims(), [1, 2, 8, 8]);
        for level in fused {
            let v = level.into_data().to_vec::<f32>().unwrap();
            assert!(v.iter().all(|x| (x - 1.0).abs() < 1e-5));
        }
    }

    #[test]
    fn top_down_of_zeros_stays_zero() {
        let device = Default::default();
        let levels = vec![
            Tensor::<B, 4>::zeros([1, 3, 4, 4], &device),
            Tensor::<B, 4>::zeros([1, 3, 2, 2], &device),
        ];
        for level in top_down(levels) {
            let v = level.into_data().to_vec::<f32>().unwrap();
            assert!(v.iter().all(|x| *x == 0.0));
        }
    }
}
