//! Fixed-point quantization schemes and constant-tensor conversion.
//!
//! A [`QuantizationScheme`] is a stateless strategy mapping an observed real range onto a target
//! integer range. [`quantize_constant`] uses one to convert weights and biases known at
//! graph-construction time; runtime activations carry pre-calibrated parameters on their
//! [`TensorInfo`](crate::tensor::TensorInfo) instead.

use std::sync::Arc;

use half::f16;
use thiserror::Error;

use crate::tensor::codec::CodecError;
use crate::tensor::{ConstTensor, DType, QuantizationInfo, Shape, TensorInfo, TensorInfoError};

/// Smallest scale any scheme returns; keeps degenerate ranges from producing a zero divisor.
pub const MIN_SCALE: f32 = f32::EPSILON;

/// `(scale, offset)` produced by [`QuantizationScheme::compute_scheme`].
pub type OffsetScalePair = (f32, i32);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantizationError {
    #[error("cannot quantize an empty buffer")]
    EmptyInput,
    #[error("observed range [{min}, {max}] is not finite")]
    NonFiniteRange { min: f32, max: f32 },
    #[error("source dtype {0} cannot be quantized")]
    UnsupportedSource(DType),
    #[error("scheme target {0} is not an 8-bit quantized type")]
    UnsupportedTarget(DType),
    #[error(transparent)]
    TensorInfo(#[from] TensorInfoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Strategy converting a real value range into fixed-point parameters.
pub trait QuantizationScheme: Send + Sync {
    /// Computes `(scale, offset)` for values observed in `[min, max]`.
    fn compute_scheme(&self, min: f64, max: f64) -> OffsetScalePair;

    fn num_bits(&self) -> u32;

    /// Integer dtype the scheme targets.
    fn dtype(&self) -> DType;
}

/// Orders the range and widens it so that zero is exactly representable.
fn normalized_range(min: f64, max: f64) -> (f64, f64) {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    (min.min(0.0), max.max(0.0))
}

fn asymmetric_scheme(min: f64, max: f64, quant_min: i64, quant_max: i64) -> OffsetScalePair {
    let (min, max) = normalized_range(min, max);
    let levels = (quant_max - quant_min) as f64;
    let scale = ((max - min) / levels).max(f64::from(MIN_SCALE));
    let offset = (quant_min as f64 - (min / scale).round()).clamp(quant_min as f64, quant_max as f64);
    (scale as f32, offset as i32)
}

/// Asymmetric unsigned 8-bit scheme: `min` maps to 0, `max` to 255.
#[derive(Debug, Clone, Copy, Default)]
pub struct QAsymmU8Scheme;

impl QuantizationScheme for QAsymmU8Scheme {
    fn compute_scheme(&self, min: f64, max: f64) -> OffsetScalePair {
        asymmetric_scheme(min, max, 0, 255)
    }

    fn num_bits(&self) -> u32 {
        8
    }

    fn dtype(&self) -> DType {
        DType::QAsymmU8
    }
}

/// Asymmetric signed 8-bit scheme: `min` maps to -128, `max` to 127.
#[derive(Debug, Clone, Copy, Default)]
pub struct QAsymmS8Scheme;

impl QuantizationScheme for QAsymmS8Scheme {
    fn compute_scheme(&self, min: f64, max: f64) -> OffsetScalePair {
        asymmetric_scheme(min, max, -128, 127)
    }

    fn num_bits(&self) -> u32 {
        8
    }

    fn dtype(&self) -> DType {
        DType::QAsymmS8
    }
}

/// Symmetric signed 8-bit scheme with a fixed zero offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct QSymmS8Scheme;

impl QuantizationScheme for QSymmS8Scheme {
    fn compute_scheme(&self, min: f64, max: f64) -> OffsetScalePair {
        let (min, max) = normalized_range(min, max);
        let extent = min.abs().max(max.abs());
        let scale = (extent / 127.0).max(f64::from(MIN_SCALE));
        (scale as f32, 0)
    }

    fn num_bits(&self) -> u32 {
        8
    }

    fn dtype(&self) -> DType {
        DType::QSymmS8
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for i8 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for half::f16 {}
}

/// Integer storage types a real value can be quantized into.
pub trait QuantizedElement: sealed::Sealed + Copy + Send + Sync + 'static {
    const LOWEST: i64;
    const HIGHEST: i64;

    fn from_clamped(value: i64) -> Self;

    fn to_i64(self) -> i64;
}

impl QuantizedElement for u8 {
    const LOWEST: i64 = u8::MIN as i64;
    const HIGHEST: i64 = u8::MAX as i64;

    fn from_clamped(value: i64) -> Self {
        value as u8
    }

    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

impl QuantizedElement for i8 {
    const LOWEST: i64 = i8::MIN as i64;
    const HIGHEST: i64 = i8::MAX as i64;

    fn from_clamped(value: i64) -> Self {
        value as i8
    }

    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

impl QuantizedElement for i32 {
    const LOWEST: i64 = i32::MIN as i64;
    const HIGHEST: i64 = i32::MAX as i64;

    fn from_clamped(value: i64) -> Self {
        value as i32
    }

    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

/// Floating-point element types accepted as constant sources.
pub trait ConstantElement: sealed::Sealed + Copy + Send + Sync + 'static {
    fn to_f32(self) -> f32;
}

impl ConstantElement for f32 {
    fn to_f32(self) -> f32 {
        self
    }
}

impl ConstantElement for f16 {
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

/// Maps a real value to `clamp(round(value / scale) + offset)`.
#[inline]
pub fn quantize<Q: QuantizedElement>(value: f32, scale: f32, offset: i32) -> Q {
    let scaled = (value / scale).round();
    let shifted = if scaled.is_nan() {
        i64::from(offset)
    } else {
        // `as` saturates for out-of-range floats, so the clamp below stays exact.
        (scaled as i64).saturating_add(i64::from(offset))
    };
    Q::from_clamped(shifted.clamp(Q::LOWEST, Q::HIGHEST))
}

/// Maps a stored integer back to `scale * (q - offset)`.
#[inline]
pub fn dequantize<Q: QuantizedElement>(value: Q, scale: f32, offset: i32) -> f32 {
    ((value.to_i64() - i64::from(offset)) as f32) * scale
}

/// Result of [`quantize_constant`]: quantized bytes plus the derived parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedConstant {
    pub bytes: Vec<u8>,
    pub scale: f32,
    pub offset: i32,
    pub dtype: DType,
}

impl QuantizedConstant {
    pub fn quantization_info(&self) -> Result<QuantizationInfo, QuantizationError> {
        Ok(QuantizationInfo::new(self.scale, self.offset)?)
    }

    /// Wraps the bytes into a constant tensor of the given shape.
    pub fn into_const_tensor(self, shape: impl Into<Shape>) -> Result<ConstTensor, QuantizationError> {
        let info = TensorInfo::quantized(shape, self.dtype, self.quantization_info()?)?;
        Ok(ConstTensor::new(info, Arc::from(self.bytes))?)
    }
}

/// Quantizes a constant buffer with parameters derived from its own value range.
///
/// The first pass computes the true elementwise min and max left to right; the second maps every
/// element through [`quantize`]. Identical inputs always produce identical outputs.
pub fn quantize_constant<T, S>(scheme: &S, source: &[T]) -> Result<QuantizedConstant, QuantizationError>
where
    T: ConstantElement,
    S: QuantizationScheme + ?Sized,
{
    if source.is_empty() {
        return Err(QuantizationError::EmptyInput);
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for value in source {
        let value = value.to_f32();
        min = min.min(value);
        max = max.max(value);
    }
    if !min.is_finite() || !max.is_finite() {
        return Err(QuantizationError::NonFiniteRange { min, max });
    }

    let (scale, offset) = scheme.compute_scheme(f64::from(min), f64::from(max));
    let dtype = scheme.dtype();
    let bytes = match dtype {
        DType::QAsymmU8 => source
            .iter()
            .map(|v| quantize::<u8>(v.to_f32(), scale, offset))
            .collect(),
        DType::QAsymmS8 | DType::QSymmS8 => source
            .iter()
            .map(|v| quantize::<i8>(v.to_f32(), scale, offset) as u8)
            .collect(),
        other => return Err(QuantizationError::UnsupportedTarget(other)),
    };

    tracing::trace!(
        elements = source.len(),
        min,
        max,
        scale,
        offset,
        dtype = %dtype,
        "quantized constant"
    );

    Ok(QuantizedConstant {
        bytes,
        scale,
        offset,
        dtype,
    })
}

/// Converts a floating-point constant tensor into a quantized one of the same shape.
pub fn create_quantized_const<S>(
    tensor: &ConstTensor,
    scheme: &S,
) -> Result<ConstTensor, QuantizationError>
where
    S: QuantizationScheme + ?Sized,
{
    let info = tensor.info();
    let quantized = match info.dtype() {
        DType::Float32 => quantize_constant(scheme, &tensor.to_f32_vec()?)?,
        DType::Float16 => {
            let values: Vec<f16> = tensor
                .bytes()
                .chunks_exact(2)
                .map(|chunk| f16::from_le_bytes([chunk[0], chunk[1]]))
                .collect();
            quantize_constant(scheme, &values)?
        }
        other => return Err(QuantizationError::UnsupportedSource(other)),
    };
    let layout = info.layout();
    let tensor = quantized.into_const_tensor(info.shape().clone())?;
    Ok(tensor.with_layout(layout))
}
