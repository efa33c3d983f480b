use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::backbone::{BackboneKind, ConvBackbone, FeatureExtractor};
use crate::error::ModelResult;
use crate::fpn::{FeaturePyramid, FeaturePyramidConfig};
use crate::head::{DbHead, DbHeadConfig, DbOutput};

/// Side length of the dummy image used to probe backbone channels.
pub const PROBE_SIZE: usize = 112;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpnDbNetConfig {
    pub backbone: BackboneKind,
    pub hidden_dim: usize,
    pub extra_head_stages: usize,
}

impl Default for FpnDbNetConfig {
    fn default() -> Self {
        Self {
            backbone: BackboneKind::Small,
            hidden_dim: 192,
            extra_head_stages: 0,
        }
    }
}

impl FpnDbNetConfig {
    pub fn head(&self) -> DbHeadConfig {
        DbHeadConfig::new(self.hidden_dim).with_extra_stages(self.extra_head_stages)
    }

    pub fn pyramid(&self) -> FeaturePyramidConfig {
        FeaturePyramidConfig::new(self.backbone.config().out_channels(), self.hidden_dim)
    }

    pub fn validate(&self) -> ModelResult<()> {
        self.backbone.config().validate()?;
        self.pyramid().validate()?;
        self.head().validate()
    }
}

/// Backbone → feature pyramid → DB head.
#[derive(Debug, Module)]
pub struct FpnDbNet<B: Backend> {
    backbone: ConvBackbone<B>,
    fpn: FeaturePyramid<B>,
    head: DbHead<B>,
}

impl<B: Backend> FpnDbNet<B> {
    pub fn new(cfg: &FpnDbNetConfig, device: &B::Device) -> ModelResult<Self> {
        cfg.validate()?;
        let backbone = ConvBackbone::new(&cfg.backbone.config(), device)?;
        let fpn = FeaturePyramid::new(&cfg.pyramid(), device)?;
        let head = DbHead::new(&cfg.head(), device)?;
        log::debug!(
            "built FpnDbNet backbone={} taps={:?} channels={:?} hidden={} upscale={}",
            cfg.backbone,
            backbone.layers(),
            backbone.out_channels(),
            cfg.hidden_dim,
            head.upscale()
        );
        Ok(Self {
            backbone,
            fpn,
            head,
        })
    }

    /// Channel count of every tap, measured by running a dummy image through
    /// the backbone.
    pub fn probe_channels(&self, device: &B::Device) -> Vec<usize> {
        let taps = self
            .backbone
            .extract(Tensor::zeros([1, 3, PROBE_SIZE, PROBE_SIZE], device));
        self.backbone
            .layers()
            .iter()
            .filter_map(|name| taps.get(name).map(|t| t.dims()[1]))
            .collect()
    }

    pub fn upscale(&self) -> usize {
        self.head.upscale()
    }

    pub fn stride_multiple(&self) -> usize {
        self.backbone.stride_multiple()
    }

    /// Fused pyramid features for `images` (`[batch, 3, H, W]`).
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut taps = self.backbone.extract(images);
        let levels = self
            .backbone
            .layers()
            .iter()
            .filter_map(|name| taps.remove(name))
            .collect();
        self.fpn.forward(levels)
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> DbOutput<B> {
        self.head.forward(self.features(images))
    }
}
