use std::sync::Arc;

use super::codec::{self, CodecError};
use super::{DType, DataLayout, Shape, TensorInfo, TensorInfoError};

/// Immutable tensor payload known at graph-construction time (weights, biases).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstTensor {
    info: TensorInfo,
    bytes: Arc<[u8]>,
}

impl ConstTensor {
    /// Wraps little-endian element bytes, checking they match the descriptor exactly.
    pub fn new(info: TensorInfo, bytes: Arc<[u8]>) -> Result<Self, TensorInfoError> {
        let expected = info
            .num_bytes()
            .ok_or_else(|| TensorInfoError::DynamicShape(info.shape().clone()))?;
        if bytes.len() != expected {
            return Err(TensorInfoError::ByteLength {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self { info, bytes })
    }

    /// Builds a `Float32` constant from host values.
    pub fn from_f32(shape: impl Into<Shape>, values: &[f32]) -> Result<Self, TensorInfoError> {
        let info = TensorInfo::new(shape, DType::Float32)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(info, Arc::from(bytes))
    }

    /// Builds a quantized `Signed32` constant, as used for integer convolution biases.
    pub fn from_i32(info: TensorInfo, values: &[i32]) -> Result<Self, TensorInfoError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(info, Arc::from(bytes))
    }

    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.info = self.info.with_layout(layout);
        self
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the payload to `f32`, dequantizing integer constants with their own parameters.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, CodecError> {
        codec::to_f32_vec(&self.info, &self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::QuantizationInfo;

    #[test]
    fn float_payload_decodes_unchanged() {
        let tensor = ConstTensor::from_f32([2], &[1.5, -2.0]).unwrap();
        assert_eq!(tensor.to_f32_vec(), Ok(vec![1.5, -2.0]));
    }

    #[test]
    fn integer_payload_is_dequantized() {
        let quant = QuantizationInfo::new(0.25, 0).unwrap();
        let info = TensorInfo::quantized([3], DType::Signed32, quant).unwrap();
        let bias = ConstTensor::from_i32(info, &[4, -8, 0]).unwrap();
        assert_eq!(bias.to_f32_vec(), Ok(vec![1.0, -2.0, 0.0]));
    }
}
