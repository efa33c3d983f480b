//! Synthetic image/mask pairs for smoke tests and quick experiments.

use crate::types::{DatasetLayout, DatasetResult, SampleIndex, SegDatasetError};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;

/// Write `count` pairs of `size`×`size` images under `root` using `layout`.
///
/// Each image is a noisy dark background with one bright axis-aligned
/// rectangle; the mask marks exactly that rectangle.
pub fn write_synthetic_dataset(
    root: &Path,
    layout: &DatasetLayout,
    count: usize,
    size: u32,
    seed: u64,
) -> DatasetResult<Vec<SampleIndex>> {
    let images_dir = root.join(&layout.images_subdir);
    let masks_dir = root.join(&layout.masks_subdir);
    for dir in [&images_dir, &masks_dir] {
        fs::create_dir_all(dir).map_err(|source| SegDatasetError::Io {
            path: dir.clone(),
            source,
        })?;
    }

    let size = size.max(4);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut written = Vec::with_capacity(count);
    for i in 0..count {
        let w = rng.random_range(size / 4..=size / 2);
        let h = rng.random_range(size / 4..=size / 2);
        let x0 = rng.random_range(0..=size - w);
        let y0 = rng.random_range(0..=size - h);
        let inside = |x: u32, y: u32| x >= x0 && x < x0 + w && y >= y0 && y < y0 + h;

        let mut img = RgbImage::new(size, size);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let noise: u8 = rng.random_range(0..40);
            *pixel = if inside(x, y) {
                Rgb([215 + noise, 180 + noise, 60])
            } else {
                Rgb([noise, noise / 2, 30 + noise])
            };
        }
        let mask = GrayImage::from_fn(size, size, |x, y| {
            Luma([if inside(x, y) { 255 } else { 0 }])
        });

        let name = format!("sample_{i:05}.png");
        let image_path = images_dir.join(&name);
        let mask_path = masks_dir.join(&name);
        img.save(&image_path)
            .map_err(|source| SegDatasetError::Image {
                path: image_path.clone(),
                source,
            })?;
        mask.save(&mask_path)
            .map_err(|source| SegDatasetError::Image {
                path: mask_path.clone(),
                source,
            })?;
        written.push(SampleIndex {
            image: image_path,
            mask: mask_path,
        });
    }
    Ok(written)
}
