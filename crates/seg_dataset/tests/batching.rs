//! Integration tests for synthetic dataset → index → batch iteration.

use burn_ndarray::NdArray;
use seg_dataset::{
    build_train_val_iters, index_pairs, write_synthetic_dataset, BatchIter, DatasetConfig,
    DatasetLayout, SegDatasetError,
};
use std::fs;

type B = NdArray<f32>;

#[test]
fn synthetic_pairs_are_indexed_in_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    let written = write_synthetic_dataset(tmp.path(), &layout, 5, 32, 11)?;
    let indexed = index_pairs(tmp.path(), &layout)?;
    assert_eq!(written, indexed);
    Ok(())
}

#[test]
fn images_without_masks_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    let written = write_synthetic_dataset(tmp.path(), &layout, 3, 16, 2)?;
    fs::remove_file(&written[1].mask)?;
    let indexed = index_pairs(tmp.path(), &layout)?;
    assert_eq!(indexed.len(), 2);
    assert!(!indexed.contains(&written[1]));
    Ok(())
}

#[test]
fn empty_root_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    fs::create_dir_all(tmp.path().join("images"))?;
    let err = index_pairs(tmp.path(), &layout).unwrap_err();
    assert!(matches!(err, SegDatasetError::Empty { .. }));
    Ok(())
}

#[test]
fn batches_have_expected_shapes_and_binary_masks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    write_synthetic_dataset(tmp.path(), &layout, 5, 40, 3)?;
    let cfg = DatasetConfig {
        target_size: Some((32, 32)),
        seed: Some(5),
        flip_horizontal_prob: 0.5,
        ..Default::default()
    };
    let mut iter = BatchIter::from_root(tmp.path(), &layout, cfg)?;
    assert_eq!(iter.num_batches(2), 3);

    let device = Default::default();
    let mut sizes = Vec::new();
    while let Some(batch) = iter.next_batch::<B>(2, &device)? {
        assert_eq!(batch.images.dims()[1..], [3, 32, 32]);
        assert_eq!(batch.masks.dims()[1..], [32, 32]);
        let mask = batch.masks.into_data().to_vec::<f32>().unwrap();
        assert!(mask.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert!(mask.iter().any(|v| *v == 1.0));
        sizes.push(batch.images.dims()[0]);
    }
    assert_eq!(sizes, vec![2, 2, 1]);

    iter.reset();
    assert!(iter.next_batch::<B>(2, &device)?.is_some());
    Ok(())
}

#[test]
fn drop_last_skips_partial_batch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    write_synthetic_dataset(tmp.path(), &layout, 5, 16, 9)?;
    let cfg = DatasetConfig {
        target_size: None,
        drop_last: true,
        ..Default::default()
    };
    let mut iter = BatchIter::from_root(tmp.path(), &layout, cfg)?;
    assert_eq!(iter.num_batches(2), 2);
    let device = Default::default();
    let mut count = 0;
    while iter.next_batch::<B>(2, &device)?.is_some() {
        count += 1;
    }
    assert_eq!(count, 2);
    Ok(())
}

#[test]
fn train_val_split_uses_every_pair_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let layout = DatasetLayout::default();
    write_synthetic_dataset(tmp.path(), &layout, 10, 16, 4)?;
    let (train, val) = build_train_val_iters(
        tmp.path(),
        &layout,
        0.3,
        DatasetConfig {
            seed: Some(1),
            ..Default::default()
        },
    )?;
    assert_eq!(train.len(), 7);
    assert_eq!(val.len(), 3);
    assert!(!val.config().shuffle);
    Ok(())
}
