//! Element decoders and encoders between tensor bytes and `f32` compute values.
//!
//! Host kernels compute in `f32` regardless of the storage dtype: inputs are decoded with the
//! tensor's quantization parameters and results are encoded back the same way. Both directions are
//! plain left-to-right loops so repeated calls are bit-identical.

use half::f16;

use super::{DType, TensorInfo};
use crate::quantization::{dequantize, quantize};

/// Failure raised when a byte buffer and its descriptor disagree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{dtype} buffer holds {actual} bytes, descriptor needs {expected}")]
    Length {
        dtype: DType,
        expected: usize,
        actual: usize,
    },
    #[error("{0} tensor is missing quantization parameters")]
    MissingQuantization(DType),
}

fn check_lengths(info: &TensorInfo, bytes: usize, values: usize) -> Result<(), CodecError> {
    let expected = values * info.dtype().size_in_bytes();
    if bytes != expected {
        return Err(CodecError::Length {
            dtype: info.dtype(),
            expected,
            actual: bytes,
        });
    }
    Ok(())
}

fn quant_params(info: &TensorInfo) -> Result<(f32, i32), CodecError> {
    info.quantization()
        .map(|q| (q.scale(), q.offset()))
        .ok_or(CodecError::MissingQuantization(info.dtype()))
}

/// Decodes `bytes` described by `info` into `out`, which must hold one slot per element.
pub fn decode_to_f32(info: &TensorInfo, bytes: &[u8], out: &mut [f32]) -> Result<(), CodecError> {
    check_lengths(info, bytes.len(), out.len())?;
    match info.dtype() {
        DType::Float32 => {
            for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        DType::Float16 => {
            for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *dst = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
            }
        }
        DType::QAsymmU8 => {
            let (scale, offset) = quant_params(info)?;
            for (dst, &byte) in out.iter_mut().zip(bytes) {
                *dst = dequantize(byte, scale, offset);
            }
        }
        DType::QAsymmS8 | DType::QSymmS8 => {
            let (scale, offset) = quant_params(info)?;
            for (dst, &byte) in out.iter_mut().zip(bytes) {
                *dst = dequantize(byte as i8, scale, offset);
            }
        }
        DType::Signed32 => {
            let (scale, offset) = quant_params(info)?;
            for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                let value = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                *dst = dequantize(value, scale, offset);
            }
        }
        DType::Boolean => {
            for (dst, &byte) in out.iter_mut().zip(bytes) {
                *dst = if byte != 0 { 1.0 } else { 0.0 };
            }
        }
    }
    Ok(())
}

/// Encodes `values` into `out` using the dtype and quantization of `info`.
pub fn encode_from_f32(info: &TensorInfo, values: &[f32], out: &mut [u8]) -> Result<(), CodecError> {
    check_lengths(info, out.len(), values.len())?;
    match info.dtype() {
        DType::Float32 => {
            for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&value.to_le_bytes());
            }
        }
        DType::Float16 => {
            for (chunk, value) in out.chunks_exact_mut(2).zip(values) {
                chunk.copy_from_slice(&f16::from_f32(*value).to_le_bytes());
            }
        }
        DType::QAsymmU8 => {
            let (scale, offset) = quant_params(info)?;
            for (dst, value) in out.iter_mut().zip(values) {
                *dst = quantize::<u8>(*value, scale, offset);
            }
        }
        DType::QAsymmS8 | DType::QSymmS8 => {
            let (scale, offset) = quant_params(info)?;
            let (lo, hi) = info.dtype().quantized_range().unwrap_or((-128, 127));
            for (dst, value) in out.iter_mut().zip(values) {
                let q = quantize::<i8>(*value, scale, offset).clamp(lo as i8, hi as i8);
                *dst = q as u8;
            }
        }
        DType::Signed32 => {
            let (scale, offset) = quant_params(info)?;
            for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&quantize::<i32>(*value, scale, offset).to_le_bytes());
            }
        }
        DType::Boolean => {
            for (dst, value) in out.iter_mut().zip(values) {
                *dst = u8::from(*value != 0.0);
            }
        }
    }
    Ok(())
}

/// Allocating convenience over [`decode_to_f32`].
pub fn to_f32_vec(info: &TensorInfo, bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    let count = bytes.len() / info.dtype().size_in_bytes();
    let mut values = vec![0.0; count];
    decode_to_f32(info, bytes, &mut values)?;
    Ok(values)
}

/// Allocating convenience over [`encode_from_f32`].
pub fn from_f32_slice(info: &TensorInfo, values: &[f32]) -> Result<Vec<u8>, CodecError> {
    let mut bytes = vec![0u8; values.len() * info.dtype().size_in_bytes()];
    encode_from_f32(info, values, &mut bytes)?;
    Ok(bytes)
}
