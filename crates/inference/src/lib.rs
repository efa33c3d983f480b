//! Checkpoint-backed mask prediction for the FPN + DB segmentation network.

#![recursion_limit = "256"]

pub mod predictor;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use predictor::SegmentationPredictor;

pub mod prelude {
    pub use crate::predictor::SegmentationPredictor;
    pub use crate::InferenceBackend;
    pub use models::FpnDbNetConfig;
}
