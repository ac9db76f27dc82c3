//! Tensor descriptors and host storage shared by the graph, backends and workloads.
//!
//! [`TensorInfo`] is the immutable descriptor attached to every output slot. [`ConstTensor`]
//! carries weights known at construction time, [`TensorHandle`] the storage bound to a workload,
//! and [`codec`] converts between stored elements and `f32` compute values.

pub mod codec;
mod constant;
mod dtype;
mod handle;
mod info;
pub mod shape;
pub mod shape_helpers;

pub use constant::ConstTensor;
pub use dtype::DType;
pub use handle::{TensorHandle, TensorView, TensorViewMut};
pub use info::{DataLayout, QuantizationInfo, TensorInfo, TensorInfoError};
pub use shape::{DimSymbol, Dimension, Shape};
