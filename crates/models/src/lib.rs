//! Burn modules for FPN + differentiable-binarization segmentation.
//!
//! - `ConvBackbone`: strided conv stages exposing named feature taps.
//! - `FeaturePyramid`: top-down fusion of the taps into one map.
//! - `DbHead`: probability/threshold decoder branches.
//! - `FpnDbNet`: the wiring of all three.
//!
//! These are pure Burn modules; the `training` crate owns losses, metrics and
//! the training loop, and `inference` wraps checkpoints for prediction.

pub mod backbone;
pub mod blocks;
pub mod error;
pub mod fpn;
pub mod head;
pub mod net;

pub use backbone::{BackboneConfig, BackboneKind, ConvBackbone, FeatureExtractor};
pub use error::{ModelError, ModelResult};
pub use fpn::{FeaturePyramid, FeaturePyramidConfig};
pub use head::{DbHead, DbHeadConfig, DbOutput};
pub use net::{FpnDbNet, FpnDbNetConfig};

pub mod prelude {
    pub use super::{
        BackboneKind, DbHead, DbHeadConfig, DbOutput, FeatureExtractor, FeaturePyramid,
        FeaturePyramidConfig, FpnDbNet, FpnDbNetConfig, ModelError,
    };
}
