//! Multi-scale convolutional backbone with named feature taps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::blocks::ConvBnRelu;
use crate::error::{ModelError, ModelResult};

/// Named-layer extraction contract consumed by the model wrapper.
pub trait FeatureExtractor<B: Backend> {
    /// Tapped layer names, shallow to deep.
    fn layers(&self) -> Vec<String>;
    /// Channel count of each tapped layer, same order as `layers`.
    fn out_channels(&self) -> Vec<usize>;
    /// Run the extractor and return every tapped layer by name.
    fn extract(&self, x: Tensor<B, 4>) -> BTreeMap<String, Tensor<B, 4>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    /// Three taps at strides 4/8/16; inputs must be multiples of 16.
    #[default]
    Small,
    /// Four taps at strides 4/8/16/32; inputs must be multiples of 32.
    Large,
}

impl BackboneKind {
    pub fn config(self) -> BackboneConfig {
        match self {
            BackboneKind::Small => BackboneConfig {
                stage_channels: vec![16, 24, 48, 96],
                first_tap: 1,
            },
            BackboneKind::Large => BackboneConfig {
                stage_channels: vec![16, 24, 40, 112, 160],
                first_tap: 1,
            },
        }
    }

    /// Input side length must be a multiple of this.
    pub fn stride_multiple(self) -> usize {
        1 << self.config().stage_channels.len()
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackboneKind::Small => f.write_str("small"),
            BackboneKind::Large => f.write_str("large"),
        }
    }
}

impl FromStr for BackboneKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(BackboneKind::Small),
            "large" => Ok(BackboneKind::Large),
            other => Err(ModelError::UnknownBackbone(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Output channels per stride-2 stage; stage `k` has stride `2^(k+1)`.
    pub stage_channels: Vec<usize>,
    /// Index of the first tapped stage; every later stage is tapped too.
    pub first_tap: usize,
}

impl BackboneConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.first_tap >= self.stage_channels.len() {
            return Err(ModelError::TapOutOfRange {
                tap: self.first_tap,
                stages: self.stage_channels.len(),
            });
        }
        Ok(())
    }

    pub fn layers(&self) -> Vec<String> {
        (self.first_tap..self.stage_channels.len())
            .map(stage_name)
            .collect()
    }

    pub fn out_channels(&self) -> Vec<usize> {
        self.stage_channels[self.first_tap.min(self.stage_channels.len())..].to_vec()
    }
}

fn stage_name(idx: usize) -> String {
    format!("stage{}", idx + 1)
}

/// Downsampling conv followed by a same-resolution refinement conv.
#[derive(Debug, Module)]
pub struct ConvStage<B: Backend> {
    down: ConvBnRelu<B>,
    refine: ConvBnRelu<B>,
}

impl<B: Backend> ConvStage<B> {
    fn new(c_in: usize, c_out: usize, device: &B::Device) -> Self {
        Self {
            down: ConvBnRelu::new(c_in, c_out, 3, 2, device),
            refine: ConvBnRelu::new(c_out, c_out, 3, 1, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.refine.forward(self.down.forward(x))
    }
}

#[derive(Debug, Module)]
pub struct ConvBackbone<B: Backend> {
    stages: Vec<ConvStage<B>>,
    first_tap: usize,
}

impl<B: Backend> ConvBackbone<B> {
    pub fn new(cfg: &BackboneConfig, device: &B::Device) -> ModelResult<Self> {
        cfg.validate()?;
        let mut c_in = 3;
        let mut stages = Vec::with_capacity(cfg.stage_channels.len());
        for &c_out in &cfg.stage_channels {
            stages.push(ConvStage::new(c_in, c_out, device));
            c_in = c_out;
        }
        Ok(Self {
            stages,
            first_tap: cfg.first_tap,
        })
    }

    /// Input sides must be a multiple of this for every tap to halve exactly.
    pub fn stride_multiple(&self) -> usize {
        1 << self.stages.len()
    }
}

impl<B: Backend> FeatureExtractor<B> for ConvBackbone<B> {
    fn layers(&self) -> Vec<String> {
        (self.first_tap..self.stages.len()).map(stage_name).collect()
    }

    fn out_channels(&self) -> Vec<usize> {
        self.stages[self.first_tap..]
            .iter()
            .map(|stage| stage.refine.out_channels())
            .collect()
    }

    fn extract(&self, x: Tensor<B, 4>) -> BTreeMap<String, Tensor<B, 4>> {
        let mut taps = BTreeMap::new();
        let mut x = x;
        for (idx, stage) in self.stages.iter().enumerate() {
            x = stage.forward(x);
            if idx >= self.first_tap {
                taps.insert(stage_name(idx), x.clone());
            }
        }
        taps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn_ndarray::NdArray<f32>;

    #[test]
    fn parses_variant_names() {
        assert_eq!("small".parse::<BackboneKind>(), Ok(BackboneKind::Small));
        assert_eq!("LARGE".parse::<BackboneKind>(), Ok(BackboneKind::Large));
        assert!("resnet".parse::<BackboneKind>().is_err());
    }

    #[test]
    fn taps_halve_in_size() {
        let device = Default::default();
        let backbone = ConvBackbone::<B>::new(&BackboneKind::Small.config(), &device).unwrap();
        let taps = backbone.extract(Tensor::zeros([1, 3, 64, 64], &device));
        let layers = backbone.layers();
        assert_eq!(layers, vec!["stage2", "stage3", "stage4"]);
        let sizes: Vec<usize> = layers.iter().map(|name| taps[name].dims()[2]).collect();
        assert_eq!(sizes, vec![16, 8, 4]);
        let chans: Vec<usize> = layers.iter().map(|name| taps[name].dims()[1]).collect();
        assert_eq!(chans, backbone.out_channels());
    }

    #[test]
    fn config_channels_match_module() {
        let device = Default::default();
        let cfg = BackboneKind::Large.config();
        let backbone = ConvBackbone::<B>::new(&cfg, &device).unwrap();
        assert_eq!(cfg.out_channels(), backbone.out_channels());
        assert_eq!(cfg.layers(), backbone.layers());
    }
}
