//! Small building blocks shared by the backbone, pyramid and head.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// Conv2d (no bias) + BatchNorm + ReLU.
#[derive(Debug, Module)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
    out_channels: usize,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel / 2;
        let conv = Conv2dConfig::new([c_in, c_out], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(c_out).init(device);
        Self {
            conv,
            bn,
            out_channels: c_out,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        relu(x)
    }
}

/// Bilinear upsampling by an integer factor with aligned corners.
///
/// Expressed as two interpolation matmuls (rows, then columns) so the result
/// matches `align_corners=True` exactly on every backend and stays
/// differentiable with respect to `x`.
pub fn upsample_bilinear<B: Backend>(x: Tensor<B, 4>, factor: usize) -> Tensor<B, 4> {
    if factor <= 1 {
        return x;
    }
    let [b, c, h, w] = x.dims();
    resize_bilinear(x, [b, c, h * factor, w * factor])
}

/// Bilinear resize to `[.., out_h, out_w]` with aligned corners.
pub fn resize_bilinear<B: Backend>(x: Tensor<B, 4>, shape: [usize; 4]) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let [_, _, out_h, out_w] = shape;
    if out_h == h && out_w == w {
        return x;
    }
    let device = x.device();
    let rows = Tensor::<B, 2>::from_data(
        TensorData::new(interpolation_weights(h, out_h), [out_h, h]),
        &device,
    )
    .reshape([1, 1, out_h, h])
    .expand([b, c, out_h, h]);
    let cols = Tensor::<B, 2>::from_data(
        TensorData::new(interpolation_weights(w, out_w), [out_w, w]),
        &device,
    )
    .transpose()
    .reshape([1, 1, w, out_w])
    .expand([b, c, w, out_w]);
    rows.matmul(x).matmul(cols)
}

/// Row-major `[out, in]` matrix of 1-D linear interpolation weights with
/// aligned corners: output `i` samples input coordinate `i * (in-1)/(out-1)`.
pub(crate) fn interpolation_weights(n_in: usize, n_out: usize) -> Vec<f32> {
    let mut weights = vec![0.0f32; n_out * n_in];
    if n_in == 0 || n_out == 0 {
        return weights;
    }
    let scale = if n_out > 1 {
        (n_in - 1) as f32 / (n_out - 1) as f32
    } else {
        0.0
    };
    for i in 0..n_out {
        let src = i as f32 * scale;
        let lo = (src.floor() as usize).min(n_in - 1);
        let hi = (lo + 1).min(n_in - 1);
        let frac = src - lo as f32;
        weights[i * n_in + lo] += 1.0 - frac;
        weights[i * n_in + hi] += frac;
    }
    weights
}
