use crate::padding::{Padding2d, Window2d};
use crate::tensor::{ConstTensor, DataLayout, TensorInfo};

/// 2-D convolution with constant weights.
///
/// Weights are `[O, H, W, I]` for NHWC networks and `[O, I, H, W]` for NCHW ones; the bias, when
/// present, is a rank-1 tensor of `O` elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Convolution2dDescriptor {
    pub weights: ConstTensor,
    pub bias: Option<ConstTensor>,
    pub stride_x: usize,
    pub stride_y: usize,
    pub dilation_x: usize,
    pub dilation_y: usize,
    pub padding: Padding2d,
    pub data_layout: DataLayout,
}

/// Weight extents resolved for the descriptor's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDims {
    pub out_channels: usize,
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Convolution2dDescriptor {
    pub fn new(weights: ConstTensor, bias: Option<ConstTensor>) -> Self {
        Self {
            weights,
            bias,
            stride_x: 1,
            stride_y: 1,
            dilation_x: 1,
            dilation_y: 1,
            padding: Padding2d::default(),
            data_layout: DataLayout::default(),
        }
    }

    pub fn with_strides(mut self, stride_y: usize, stride_x: usize) -> Self {
        self.stride_y = stride_y;
        self.stride_x = stride_x;
        self
    }

    pub fn with_dilation(mut self, dilation_y: usize, dilation_x: usize) -> Self {
        self.dilation_y = dilation_y;
        self.dilation_x = dilation_x;
        self
    }

    pub fn with_padding(mut self, padding: Padding2d) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.data_layout = layout;
        self
    }

    pub fn filter_dims(&self) -> Result<FilterDims, String> {
        let dims = self
            .weights
            .info()
            .static_dims()
            .ok_or_else(|| "weights must have a static shape".to_string())?;
        if dims.len() != 4 {
            return Err(format!("weights must be rank 4, got rank {}", dims.len()));
        }
        Ok(match self.data_layout {
            DataLayout::Nhwc => FilterDims {
                out_channels: dims[0],
                height: dims[1],
                width: dims[2],
                in_channels: dims[3],
            },
            DataLayout::Nchw => FilterDims {
                out_channels: dims[0],
                in_channels: dims[1],
                height: dims[2],
                width: dims[3],
            },
        })
    }

    pub fn window(&self) -> Result<Window2d, String> {
        let filter = self.filter_dims()?;
        Ok(Window2d {
            filter_h: filter.height,
            filter_w: filter.width,
            stride_y: self.stride_y,
            stride_x: self.stride_x,
            dilation_y: self.dilation_y,
            dilation_x: self.dilation_x,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        let filter = self.filter_dims()?;
        if self.stride_x == 0 || self.stride_y == 0 {
            return Err(format!(
                "strides must be positive, got ({}, {})",
                self.stride_y, self.stride_x
            ));
        }
        if self.dilation_x == 0 || self.dilation_y == 0 {
            return Err(format!(
                "dilations must be positive, got ({}, {})",
                self.dilation_y, self.dilation_x
            ));
        }
        if let Some(bias) = &self.bias {
            let dims = bias.info().static_dims().unwrap_or_default();
            if dims != [filter.out_channels] {
                return Err(format!(
                    "bias shape {} does not match {} output channels",
                    bias.info().shape(),
                    filter.out_channels
                ));
            }
        }
        Ok(())
    }

    /// Checks that `input` can feed these weights: matching channel count and a compatible
    /// element type (float weights for float inputs, 8-bit weights for quantized inputs).
    pub fn validate_input(&self, input: &TensorInfo) -> Result<(), String> {
        let filter = self.filter_dims()?;
        let dims = input
            .static_dims()
            .ok_or_else(|| format!("input shape {} is not static", input.shape()))?;
        if dims.len() != 4 {
            return Err(format!("input must be rank 4, got {}", input.shape()));
        }
        let channels = dims[self.data_layout.channels_index()];
        if channels != filter.in_channels {
            return Err(format!(
                "input has {channels} channels but weights expect {}",
                filter.in_channels
            ));
        }
        let weights = self.weights.info().dtype();
        if input.dtype().is_float() != weights.is_float() {
            return Err(format!(
                "{} weights cannot be applied to a {} input",
                weights,
                input.dtype()
            ));
        }
        Ok(())
    }
}
