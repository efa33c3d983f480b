//! Core types and error definitions for seg_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, SegDatasetError>;

#[derive(Debug, Error)]
pub enum SegDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("mask for {image} not found at {mask}")]
    MissingMask { image: PathBuf, mask: PathBuf },
    #[error("mask {mask} is {mask_size:?} but image is {image_size:?}")]
    SizeMismatch {
        mask: PathBuf,
        image_size: (u32, u32),
        mask_size: (u32, u32),
    },
    #[error("no image/mask pairs under {root}")]
    Empty { root: PathBuf },
    #[error("{0}")]
    Other(String),
}

/// One decoded image/mask pair.
#[derive(Debug, Clone)]
pub struct SegSample {
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    /// Binary mask in HW layout, values are 0.0 or 1.0.
    pub mask: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl SegSample {
    pub fn foreground_fraction(&self) -> f32 {
        if self.mask.is_empty() {
            return 0.0;
        }
        self.mask.iter().sum::<f32>() / self.mask.len() as f32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    pub image: PathBuf,
    pub mask: PathBuf,
}

/// Subdirectory layout of a dataset root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    pub images_subdir: String,
    pub masks_subdir: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            images_subdir: "images".to_string(),
            masks_subdir: "masks".to_string(),
        }
    }
}
