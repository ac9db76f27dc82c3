use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DType, Dimension, Shape};

/// Rejection raised while building a [`TensorInfo`] or [`QuantizationInfo`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorInfoError {
    #[error("dimension {axis} of shape {shape} must be positive")]
    ZeroDimension { axis: usize, shape: Shape },
    #[error("dtype {0} requires quantization parameters")]
    MissingQuantization(DType),
    #[error("dtype {0} does not take quantization parameters")]
    UnexpectedQuantization(DType),
    #[error("quantization scale must be finite and positive, got {0}")]
    InvalidScale(f32),
    #[error("offset {offset} is outside the {dtype} range")]
    OffsetOutOfRange { dtype: DType, offset: i32 },
    #[error("tensor storage needs a static shape, got {0}")]
    DynamicShape(Shape),
    #[error("buffer of {actual} bytes does not match descriptor ({expected} bytes)")]
    ByteLength { expected: usize, actual: usize },
}

/// Memory ordering of a rank-4 activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataLayout {
    #[default]
    Nhwc,
    Nchw,
}

impl DataLayout {
    pub fn height_index(self) -> usize {
        match self {
            DataLayout::Nhwc => 1,
            DataLayout::Nchw => 2,
        }
    }

    pub fn width_index(self) -> usize {
        match self {
            DataLayout::Nhwc => 2,
            DataLayout::Nchw => 3,
        }
    }

    pub fn channels_index(self) -> usize {
        match self {
            DataLayout::Nhwc => 3,
            DataLayout::Nchw => 1,
        }
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLayout::Nhwc => f.write_str("NHWC"),
            DataLayout::Nchw => f.write_str("NCHW"),
        }
    }
}

/// Affine fixed-point mapping `real = scale * (q - offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationInfo {
    scale: f32,
    offset: i32,
}

impl QuantizationInfo {
    pub fn new(scale: f32, offset: i32) -> Result<Self, TensorInfoError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TensorInfoError::InvalidScale(scale));
        }
        Ok(Self { scale, offset })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }
}

/// Immutable shape, dtype, layout and quantization metadata of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    shape: Shape,
    dtype: DType,
    layout: DataLayout,
    quantization: Option<QuantizationInfo>,
}

impl TensorInfo {
    /// Describes a floating-point tensor in the default NHWC layout.
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Result<Self, TensorInfoError> {
        Self::build(shape.into(), dtype, DataLayout::default(), None)
    }

    /// Describes an integer tensor together with its quantization parameters.
    pub fn quantized(
        shape: impl Into<Shape>,
        dtype: DType,
        quantization: QuantizationInfo,
    ) -> Result<Self, TensorInfoError> {
        Self::build(shape.into(), dtype, DataLayout::default(), Some(quantization))
    }

    fn build(
        shape: Shape,
        dtype: DType,
        layout: DataLayout,
        quantization: Option<QuantizationInfo>,
    ) -> Result<Self, TensorInfoError> {
        for (axis, dim) in shape.dims().iter().enumerate() {
            if matches!(dim, Dimension::Static(0)) {
                return Err(TensorInfoError::ZeroDimension { axis, shape });
            }
        }
        match (dtype.is_quantized(), quantization) {
            (true, None) => return Err(TensorInfoError::MissingQuantization(dtype)),
            (false, Some(_)) => return Err(TensorInfoError::UnexpectedQuantization(dtype)),
            (true, Some(q)) => {
                if let Some((lo, hi)) = dtype.quantized_range() {
                    let offset = i64::from(q.offset());
                    if offset < lo || offset > hi {
                        return Err(TensorInfoError::OffsetOutOfRange {
                            dtype,
                            offset: q.offset(),
                        });
                    }
                }
                if dtype == DType::QSymmS8 && q.offset() != 0 {
                    return Err(TensorInfoError::OffsetOutOfRange {
                        dtype,
                        offset: q.offset(),
                    });
                }
            }
            (false, None) => {}
        }
        Ok(Self {
            shape,
            dtype,
            layout,
            quantization,
        })
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Returns a copy describing `shape` with the same dtype, layout and quantization.
    pub fn with_shape(&self, shape: impl Into<Shape>) -> Result<Self, TensorInfoError> {
        Self::build(shape.into(), self.dtype, self.layout, self.quantization)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    pub fn quantization(&self) -> Option<QuantizationInfo> {
        self.quantization
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn is_dynamic(&self) -> bool {
        self.shape.is_dynamic()
    }

    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.shape.static_dims()
    }

    pub fn num_elements(&self) -> Option<usize> {
        self.shape.element_count()
    }

    pub fn num_bytes(&self) -> Option<usize> {
        self.num_elements()?.checked_mul(self.dtype.size_in_bytes())
    }

    /// Same dtype and quantization, ignoring shape and layout.
    pub fn is_type_space_match(&self, other: &TensorInfo) -> bool {
        self.dtype == other.dtype && self.quantization == other.quantization
    }

    /// Same shape, dtype and layout; quantization parameters are not compared.
    pub fn matches_ignoring_quantization(&self, other: &TensorInfo) -> bool {
        self.shape == other.shape && self.dtype == other.dtype && self.layout == other.layout
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dtype, self.shape, self.layout)?;
        if let Some(q) = self.quantization {
            write!(f, " (scale={}, offset={})", q.scale(), q.offset())?;
        }
        Ok(())
    }
}
