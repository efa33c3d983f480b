use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use models::{FpnDbNet, FpnDbNetConfig};
use std::path::Path;
use training::{load_checkpoint, predict_mask};

use crate::InferenceBackend;

/// Binary mask predictor over a trained [`FpnDbNet`].
pub struct SegmentationPredictor {
    model: FpnDbNet<InferenceBackend>,
    cfg: FpnDbNetConfig,
    threshold: f32,
    device: <InferenceBackend as Backend>::Device,
}

impl SegmentationPredictor {
    pub fn from_checkpoint(
        path: &Path,
        fallback: &FpnDbNetConfig,
        threshold: f32,
    ) -> anyhow::Result<Self> {
        let device = <InferenceBackend as Backend>::Device::default();
        let (model, meta) = load_checkpoint::<InferenceBackend>(path, fallback, &device)?;
        let cfg = meta.map(|m| m.model).unwrap_or_else(|| fallback.clone());
        Ok(Self {
            model,
            cfg,
            threshold,
            device,
        })
    }

    /// Untrained weights; only useful for wiring checks.
    pub fn fresh(cfg: &FpnDbNetConfig, threshold: f32) -> anyhow::Result<Self> {
        let device = <InferenceBackend as Backend>::Device::default();
        Ok(Self {
            model: FpnDbNet::new(cfg, &device)?,
            cfg: cfg.clone(),
            threshold,
            device,
        })
    }

    /// Load `weights` when given and readable, otherwise fall back to fresh
    /// weights with a warning.
    pub fn build(
        weights: Option<&Path>,
        cfg: &FpnDbNetConfig,
        threshold: f32,
    ) -> anyhow::Result<Self> {
        if let Some(path) = weights.filter(|p| p.exists()) {
            match Self::from_checkpoint(path, cfg, threshold) {
                Ok(predictor) => return Ok(predictor),
                Err(err) => log::warn!("{err}; falling back to untrained weights"),
            }
        } else {
            log::warn!("no checkpoint provided; using untrained weights");
        }
        Self::fresh(cfg, threshold)
    }

    pub fn config(&self) -> &FpnDbNetConfig {
        &self.cfg
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// `[N, 3, H, W]` in [0, 1] to `[N, H', W']` 0/1 masks.
    pub fn predict_tensor(&self, images: Tensor<InferenceBackend, 4>) -> Tensor<InferenceBackend, 3> {
        let output = self.model.forward(images);
        predict_mask(output.prob, self.threshold)
    }

    /// Mask with the same size as `image`; foreground is 255.
    pub fn predict(&self, image: &RgbImage) -> GrayImage {
        let (w, h) = image.dimensions();
        let stride = self.cfg.backbone.stride_multiple() as u32;
        let (in_w, in_h) = (round_up(w, stride), round_up(h, stride));
        let resized;
        let input = if (in_w, in_h) == (w, h) {
            image
        } else {
            resized = image::imageops::resize(image, in_w, in_h, FilterType::Triangle);
            &resized
        };

        let mut chw = vec![0.0f32; (3 * in_w * in_h) as usize];
        let plane = (in_w * in_h) as usize;
        for (x, y, pixel) in input.enumerate_pixels() {
            let i = (y * in_w + x) as usize;
            for c in 0..3 {
                chw[c * plane + i] = pixel[c] as f32 / 255.0;
            }
        }
        let tensor = Tensor::<InferenceBackend, 4>::from_data(
            TensorData::new(chw, [1, 3, in_h as usize, in_w as usize]),
            &self.device,
        );
        let pred = self.predict_tensor(tensor);
        let [_, out_h, out_w] = pred.dims();
        let values = pred.into_data().to_vec::<f32>().unwrap_or_default();

        let mask = GrayImage::from_fn(out_w as u32, out_h as u32, |x, y| {
            let v = values
                .get(y as usize * out_w + x as usize)
                .copied()
                .unwrap_or(0.0);
            image::Luma([if v > 0.5 { 255 } else { 0 }])
        });
        if mask.dimensions() == (w, h) {
            mask
        } else {
            image::imageops::resize(&mask, w, h, FilterType::Nearest)
        }
    }
}

fn round_up(v: u32, multiple: u32) -> u32 {
    let m = multiple.max(1);
    v.max(1).div_ceil(m) * m
}
