//! Indexing image/mask pairs on disk and splitting them.

use crate::types::{DatasetLayout, DatasetResult, SampleIndex, SegDatasetError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Pair every image under `<root>/<images_subdir>` with `<root>/<masks_subdir>/<stem>.png`.
///
/// Images without a mask are skipped with a warning; an empty result is an error.
pub fn index_pairs(root: &Path, layout: &DatasetLayout) -> DatasetResult<Vec<SampleIndex>> {
    let images_dir = root.join(&layout.images_subdir);
    let masks_dir = root.join(&layout.masks_subdir);
    let entries = fs::read_dir(&images_dir).map_err(|source| SegDatasetError::Io {
        path: images_dir.clone(),
        source,
    })?;

    let mut indices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SegDatasetError::Io {
            path: images_dir.clone(),
            source,
        })?;
        let image = entry.path();
        let is_image = image
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let mask = masks_dir.join(format!("{stem}.png"));
        if !mask.exists() {
            log::warn!(
                "skipping {}: {}",
                image.display(),
                SegDatasetError::MissingMask {
                    image: image.clone(),
                    mask
                }
            );
            continue;
        }
        indices.push(SampleIndex { image, mask });
    }

    if indices.is_empty() {
        return Err(SegDatasetError::Empty {
            root: root.to_path_buf(),
        });
    }
    // read_dir order is platform dependent.
    indices.sort_by(|a, b| a.image.cmp(&b.image));
    Ok(indices)
}

/// Deterministically split `indices` into (train, val).
///
/// With a positive ratio and at least two samples, validation always gets at
/// least one sample and training keeps at least one.
pub fn split_pairs(
    mut indices: Vec<SampleIndex>,
    val_ratio: f32,
    seed: u64,
) -> (Vec<SampleIndex>, Vec<SampleIndex>) {
    let ratio = val_ratio.clamp(0.0, 1.0);
    if ratio <= 0.0 || indices.len() < 2 {
        return (indices, Vec::new());
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let n_val = ((indices.len() as f32 * ratio).round() as usize).clamp(1, indices.len() - 1);
    let val = indices.split_off(indices.len() - n_val);
    (indices, val)
}
