//! Segmentation dataset loading and Burn-compatible batching.
//!
//! This crate provides utilities for:
//! - Indexing image/mask pairs from a dataset root
//! - Deterministic train/val splitting
//! - Joint image/mask resizing and augmentation
//! - Burn batch iteration
//! - Synthetic datasets for smoke tests

pub mod aug;
pub mod index;
pub mod synthetic;
pub mod types;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use aug::{load_sample, DatasetConfig};
pub use index::{index_pairs, split_pairs};
pub use synthetic::write_synthetic_dataset;
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::{build_train_val_iters, BatchIter, SegBatch};
