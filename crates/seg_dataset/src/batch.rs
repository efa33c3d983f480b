//! Batch iteration for training and validation.

use crate::aug::{load_sample, DatasetConfig};
use crate::index::{index_pairs, split_pairs};
use crate::types::{DatasetLayout, DatasetResult, SampleIndex, SegDatasetError};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;

/// Images `[N, 3, H, W]` in [0, 1] and masks `[N, H, W]` in {0, 1}.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub masks: Tensor<B, 3>,
}

impl<B: Backend> SegBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index `root`, split it and build (train, val) iterators.
pub fn build_train_val_iters(
    root: &Path,
    layout: &DatasetLayout,
    val_ratio: f32,
    train_cfg: DatasetConfig,
) -> DatasetResult<(BatchIter, BatchIter)> {
    let indices = index_pairs(root, layout)?;
    let (train_idx, val_idx) = split_pairs(indices, val_ratio, train_cfg.seed.unwrap_or(0));
    let val_cfg = train_cfg.for_validation();
    Ok((
        BatchIter::from_indices(train_idx, train_cfg),
        BatchIter::from_indices(val_idx, val_cfg),
    ))
}

pub struct BatchIter {
    indices: Vec<SampleIndex>,
    cursor: usize,
    pass: u64,
    cfg: DatasetConfig,
    rng: rand::rngs::StdRng,
    images_buf: Vec<f32>,
    masks_buf: Vec<f32>,
}

impl BatchIter {
    pub fn from_root(root: &Path, layout: &DatasetLayout, cfg: DatasetConfig) -> DatasetResult<Self> {
        Ok(Self::from_indices(index_pairs(root, layout)?, cfg))
    }

    pub fn from_indices(indices: Vec<SampleIndex>, cfg: DatasetConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        let mut iter = Self {
            indices,
            cursor: 0,
            pass: 0,
            cfg,
            rng,
            images_buf: Vec::new(),
            masks_buf: Vec::new(),
        };
        iter.shuffle();
        iter
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    /// Number of batches one pass yields at `batch_size`.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        let batch_size = batch_size.max(1);
        if self.cfg.drop_last {
            self.len() / batch_size
        } else {
            self.len().div_ceil(batch_size)
        }
    }

    /// Rewind for another pass, reshuffling when configured.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.pass += 1;
        self.shuffle();
    }

    fn shuffle(&mut self) {
        if self.cfg.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<SegBatch<B>>> {
        let batch_size = batch_size.max(1);
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.indices.len());
        if self.cfg.drop_last && end - self.cursor < batch_size {
            self.cursor = self.indices.len();
            return Ok(None);
        }
        let start = self.cursor;
        self.cursor = end;

        let base_id = self.pass * self.indices.len() as u64 + start as u64;
        let cfg = &self.cfg;
        let loaded: Vec<_> = self.indices[start..end]
            .par_iter()
            .enumerate()
            .map(|(i, idx)| load_sample(idx, cfg, base_id + i as u64))
            .collect();

        self.images_buf.clear();
        self.masks_buf.clear();
        let mut size: Option<(u32, u32)> = None;
        for res in loaded {
            let sample = res?;
            let this = (sample.width, sample.height);
            match size {
                None => size = Some(this),
                Some(sz) if sz != this => {
                    return Err(SegDatasetError::Other(
                        "batch contains varying image sizes; set a target_size to force consistency"
                            .to_string(),
                    ));
                }
                _ => {}
            }
            self.images_buf.extend_from_slice(&sample.image_chw);
            self.masks_buf.extend_from_slice(&sample.mask);
        }

        let Some((width, height)) = size else {
            return Ok(None);
        };
        let n = end - start;
        let (w, h) = (width as usize, height as usize);
        let images = Tensor::<B, 1>::from_floats(self.images_buf.as_slice(), device)
            .reshape([n, 3, h, w]);
        let masks =
            Tensor::<B, 1>::from_floats(self.masks_buf.as_slice(), device).reshape([n, h, w]);
        Ok(Some(SegBatch { images, masks }))
    }
}
