//! Host kernels of the reference backend.
//!
//! Every kernel reads and writes `f32` slices that the workload has already decoded from (and will
//! encode back to) the tensors' storage dtype. Loops are plain and ordered so results are
//! bit-identical from run to run.

use tessel_rs::layers::{
    ActivationDescriptor, FilterDims, PaddingMethod, PoolingAlgorithm, UnaryOperation,
};
use tessel_rs::padding::ExplicitPadding;
use tessel_rs::tensor::shape_helpers::SpatialDims;
use tessel_rs::DataLayout;

/// Geometry of a pooling kernel resolved at workload construction.
#[derive(Debug, Clone, Copy)]
pub struct PoolingParams {
    pub algorithm: PoolingAlgorithm,
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride_y: usize,
    pub stride_x: usize,
    pub padding: ExplicitPadding,
    pub padding_method: PaddingMethod,
}

pub fn op_pooling2d(
    input_dims: &SpatialDims,
    output_dims: &SpatialDims,
    params: &PoolingParams,
    input: &[f32],
    output: &mut [f32],
) {
    let in_h = input_dims.height as isize;
    let in_w = input_dims.width as isize;
    let pad_top = params.padding.top as isize;
    let pad_left = params.padding.left as isize;
    // Windows may overhang the trailing padding under ceiling rounding; that overhang never counts.
    let limit_h = in_h + params.padding.bottom as isize;
    let limit_w = in_w + params.padding.right as isize;

    for n in 0..output_dims.batch {
        for c in 0..output_dims.channels {
            for oh in 0..output_dims.height {
                let h_start = (oh * params.stride_y) as isize - pad_top;
                let h_end = (h_start + params.pool_height as isize).min(limit_h);
                for ow in 0..output_dims.width {
                    let w_start = (ow * params.stride_x) as isize - pad_left;
                    let w_end = (w_start + params.pool_width as isize).min(limit_w);

                    let padded_area = ((h_end - h_start) * (w_end - w_start)).max(0);
                    let y0 = h_start.max(0);
                    let y1 = h_end.min(in_h);
                    let x0 = w_start.max(0);
                    let x1 = w_end.min(in_w);

                    let value = if y0 >= y1 || x0 >= x1 {
                        // window lies entirely inside padding
                        0.0
                    } else {
                        let area = match params.padding_method {
                            PaddingMethod::IgnoreValue => padded_area,
                            PaddingMethod::Exclude => (y1 - y0) * (x1 - x0),
                        } as f32;
                        let mut acc = match params.algorithm {
                            PoolingAlgorithm::Max => f32::NEG_INFINITY,
                            PoolingAlgorithm::Average | PoolingAlgorithm::L2 => 0.0,
                        };
                        for y in y0..y1 {
                            for x in x0..x1 {
                                let v = input[input_dims.index(n, c, y as usize, x as usize)];
                                match params.algorithm {
                                    PoolingAlgorithm::Max => acc = acc.max(v),
                                    PoolingAlgorithm::Average => acc += v,
                                    PoolingAlgorithm::L2 => acc += v * v,
                                }
                            }
                        }
                        match params.algorithm {
                            PoolingAlgorithm::Max => acc,
                            PoolingAlgorithm::Average => acc / area,
                            PoolingAlgorithm::L2 => (acc / area).sqrt(),
                        }
                    };
                    output[output_dims.index(n, c, oh, ow)] = value;
                }
            }
        }
    }
}

/// Convolution geometry plus decoded constant operands.
#[derive(Debug, Clone)]
pub struct ConvolutionParams {
    pub filter: FilterDims,
    pub stride_y: usize,
    pub stride_x: usize,
    pub dilation_y: usize,
    pub dilation_x: usize,
    pub padding: ExplicitPadding,
    pub weights: Vec<f32>,
    pub bias: Option<Vec<f32>>,
}

impl ConvolutionParams {
    #[inline]
    fn weight(&self, input_dims: &SpatialDims, o: usize, i: usize, ky: usize, kx: usize) -> f32 {
        let f = &self.filter;
        let index = match input_dims.layout {
            DataLayout::Nhwc => ((o * f.height + ky) * f.width + kx) * f.in_channels + i,
            DataLayout::Nchw => ((o * f.in_channels + i) * f.height + ky) * f.width + kx,
        };
        self.weights[index]
    }
}

pub fn op_convolution2d(
    input_dims: &SpatialDims,
    output_dims: &SpatialDims,
    params: &ConvolutionParams,
    input: &[f32],
    output: &mut [f32],
) {
    let in_h = input_dims.height as isize;
    let in_w = input_dims.width as isize;
    for n in 0..output_dims.batch {
        for o in 0..output_dims.channels {
            let bias = params.bias.as_ref().map_or(0.0, |bias| bias[o]);
            for oh in 0..output_dims.height {
                let base_y = (oh * params.stride_y) as isize - params.padding.top as isize;
                for ow in 0..output_dims.width {
                    let base_x = (ow * params.stride_x) as isize - params.padding.left as isize;
                    let mut acc = 0.0f32;
                    for ky in 0..params.filter.height {
                        let y = base_y + (ky * params.dilation_y) as isize;
                        if y < 0 || y >= in_h {
                            continue;
                        }
                        for kx in 0..params.filter.width {
                            let x = base_x + (kx * params.dilation_x) as isize;
                            if x < 0 || x >= in_w {
                                continue;
                            }
                            for i in 0..params.filter.in_channels {
                                let v = input[input_dims.index(n, i, y as usize, x as usize)];
                                acc += v * params.weight(input_dims, o, i, ky, kx);
                            }
                        }
                    }
                    output[output_dims.index(n, o, oh, ow)] = acc + bias;
                }
            }
        }
    }
}

pub fn op_activation(descriptor: &ActivationDescriptor, input: &[f32], output: &mut [f32]) {
    for (dst, &x) in output.iter_mut().zip(input) {
        *dst = descriptor.apply(x);
    }
}

/// Normalizes every `(n, h, w)` position across its channels.
pub fn op_l2_normalization(dims: &SpatialDims, eps: f32, input: &[f32], output: &mut [f32]) {
    for n in 0..dims.batch {
        for h in 0..dims.height {
            for w in 0..dims.width {
                let mut sum = 0.0f32;
                for c in 0..dims.channels {
                    let v = input[dims.index(n, c, h, w)];
                    sum += v * v;
                }
                let inv = 1.0 / sum.max(eps).sqrt();
                for c in 0..dims.channels {
                    let index = dims.index(n, c, h, w);
                    output[index] = input[index] * inv;
                }
            }
        }
    }
}

pub fn op_elementwise_unary(operation: UnaryOperation, input: &[f32], output: &mut [f32]) {
    for (dst, &x) in output.iter_mut().zip(input) {
        *dst = operation.apply(x);
    }
}
