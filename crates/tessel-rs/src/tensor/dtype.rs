use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumerates element types a tensor descriptor may carry.
///
/// Every integer kind except `Boolean` is a fixed-point representation and therefore requires
/// quantization parameters on its [`TensorInfo`](super::TensorInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Float16,
    /// Asymmetric unsigned 8-bit, full `0..=255` range.
    QAsymmU8,
    /// Asymmetric signed 8-bit, full `-128..=127` range.
    QAsymmS8,
    /// Symmetric signed 8-bit, `-127..=127`, offset always zero.
    QSymmS8,
    /// Signed 32-bit accumulator type (quantized convolution bias).
    Signed32,
    /// One byte per element, zero is false.
    Boolean,
}

impl DType {
    /// Returns `true` for floating-point element types.
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float16)
    }

    /// Returns `true` when the dtype is an integer kind and must carry quantization parameters.
    pub fn is_quantized(self) -> bool {
        matches!(
            self,
            DType::QAsymmU8 | DType::QAsymmS8 | DType::QSymmS8 | DType::Signed32
        )
    }

    /// Storage size of a single element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Float32 | DType::Signed32 => 4,
            DType::Float16 => 2,
            DType::QAsymmU8 | DType::QAsymmS8 | DType::QSymmS8 | DType::Boolean => 1,
        }
    }

    /// Inclusive integer range representable by a quantized dtype.
    pub fn quantized_range(self) -> Option<(i64, i64)> {
        match self {
            DType::QAsymmU8 => Some((0, 255)),
            DType::QAsymmS8 => Some((-128, 127)),
            DType::QSymmS8 => Some((-127, 127)),
            DType::Signed32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DType::Float32 | DType::Float16 | DType::Boolean => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Float32 => "Float32",
            DType::Float16 => "Float16",
            DType::QAsymmU8 => "QAsymmU8",
            DType::QAsymmS8 => "QAsymmS8",
            DType::QSymmS8 => "QSymmS8",
            DType::Signed32 => "Signed32",
            DType::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
