//! Resizing and augmentation applied jointly to an image and its mask.

use crate::types::{DatasetResult, SampleIndex, SegDatasetError, SegSample};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Resize every pair to this (width, height). If None, pairs must already share shape.
    pub target_size: Option<(u32, u32)>,
    /// Probability of flipping image and mask horizontally.
    pub flip_horizontal_prob: f32,
    /// Probability of applying a light brightness/contrast jitter to the image.
    pub color_jitter_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub color_jitter_strength: f32,
    /// Mask pixels strictly above this value are foreground.
    pub mask_threshold: u8,
    /// Shuffle samples at the start of every pass.
    pub shuffle: bool,
    /// Seed for reproducible shuffling and augmentation.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_size: Some((112, 112)),
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.1,
            mask_threshold: 127,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

impl DatasetConfig {
    /// Same geometry, no shuffling or augmentation.
    pub fn for_validation(&self) -> Self {
        Self {
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            shuffle: false,
            drop_last: false,
            ..self.clone()
        }
    }

    pub fn describe(&self) -> String {
        let ts = self
            .target_size
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "target_size={} flip_p={:.2} color_jitter_p={:.2} strength={:.2} mask_thresh={} shuffle={} seed={}",
            ts,
            self.flip_horizontal_prob,
            self.color_jitter_prob,
            self.color_jitter_strength,
            self.mask_threshold,
            self.shuffle,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

/// Decode, resize and augment one pair. `sample_id` decorrelates per-sample
/// randomness when a seed is set.
pub fn load_sample(
    idx: &SampleIndex,
    cfg: &DatasetConfig,
    sample_id: u64,
) -> DatasetResult<SegSample> {
    let img = image::open(&idx.image)
        .map_err(|source| SegDatasetError::Image {
            path: idx.image.clone(),
            source,
        })?
        .to_rgb8();
    let mask = image::open(&idx.mask)
        .map_err(|source| SegDatasetError::Image {
            path: idx.mask.clone(),
            source,
        })?
        .to_luma8();
    if img.dimensions() != mask.dimensions() {
        return Err(SegDatasetError::SizeMismatch {
            mask: idx.mask.clone(),
            image_size: img.dimensions(),
            mask_size: mask.dimensions(),
        });
    }

    let mut rng_local;
    let mut seeded_rng;
    let rng: &mut dyn rand::RngCore = if let Some(seed) = cfg.seed {
        seeded_rng = rand::rngs::StdRng::seed_from_u64(seed ^ sample_id);
        &mut seeded_rng
    } else {
        rng_local = rand::rng();
        &mut rng_local
    };

    let (mut img, mut mask) = match cfg.target_size {
        Some((w, h)) if (w, h) != img.dimensions() => (
            image::imageops::resize(&img, w, h, FilterType::Triangle),
            // Nearest keeps the mask binary.
            image::imageops::resize(&mask, w, h, FilterType::Nearest),
        ),
        _ => (img, mask),
    };

    maybe_hflip(&mut img, &mut mask, cfg.flip_horizontal_prob, rng);
    maybe_jitter(
        &mut img,
        cfg.color_jitter_prob,
        cfg.color_jitter_strength,
        rng,
    );
    Ok(build_sample(&img, &mask, cfg.mask_threshold))
}

fn build_sample(img: &RgbImage, mask: &GrayImage, threshold: u8) -> SegSample {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut image_chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        image_chw[base] = pixel[0] as f32 / 255.0;
        image_chw[plane + base] = pixel[1] as f32 / 255.0;
        image_chw[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    let mask = mask
        .pixels()
        .map(|p| if p[0] > threshold { 1.0 } else { 0.0 })
        .collect();
    SegSample {
        image_chw,
        mask,
        width,
        height,
    }
}

pub(crate) fn maybe_hflip(
    img: &mut RgbImage,
    mask: &mut GrayImage,
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
        image::imageops::flip_horizontal_in_place(mask);
    }
}

pub(crate) fn maybe_jitter(
    img: &mut RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let mut v = (v - 0.5) * contrast + 0.5;
            v *= bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}
