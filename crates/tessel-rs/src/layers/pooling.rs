use serde::{Deserialize, Serialize};

use crate::padding::{OutputShapeRounding, Padding2d, Window2d};
use crate::tensor::DataLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolingAlgorithm {
    Max,
    Average,
    /// Square root of the mean of squares over the window.
    L2,
}

/// How padded positions take part in Average and L2 pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaddingMethod {
    /// Padded positions count as zeros in the divisor.
    IgnoreValue,
    /// Only real input positions are averaged.
    #[default]
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pooling2dDescriptor {
    pub algorithm: PoolingAlgorithm,
    pub pool_width: usize,
    pub pool_height: usize,
    pub stride_x: usize,
    pub stride_y: usize,
    pub padding: Padding2d,
    pub padding_method: PaddingMethod,
    pub output_shape_rounding: OutputShapeRounding,
    pub data_layout: DataLayout,
}

impl Pooling2dDescriptor {
    /// Square window with matching stride, valid padding and NHWC layout.
    pub fn new(algorithm: PoolingAlgorithm, pool: usize, stride: usize) -> Self {
        Self {
            algorithm,
            pool_width: pool,
            pool_height: pool,
            stride_x: stride,
            stride_y: stride,
            padding: Padding2d::default(),
            padding_method: PaddingMethod::default(),
            output_shape_rounding: OutputShapeRounding::default(),
            data_layout: DataLayout::default(),
        }
    }

    pub fn with_padding(mut self, padding: Padding2d) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_padding_method(mut self, method: PaddingMethod) -> Self {
        self.padding_method = method;
        self
    }

    pub fn with_rounding(mut self, rounding: OutputShapeRounding) -> Self {
        self.output_shape_rounding = rounding;
        self
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.data_layout = layout;
        self
    }

    pub fn window(&self) -> Window2d {
        Window2d {
            filter_h: self.pool_height,
            filter_w: self.pool_width,
            stride_y: self.stride_y,
            stride_x: self.stride_x,
            dilation_y: 1,
            dilation_x: 1,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pool_width == 0 || self.pool_height == 0 {
            return Err(format!(
                "pool size must be positive, got {}x{}",
                self.pool_height, self.pool_width
            ));
        }
        if self.stride_x == 0 || self.stride_y == 0 {
            return Err(format!(
                "strides must be positive, got ({}, {})",
                self.stride_y, self.stride_x
            ));
        }
        Ok(())
    }
}
