//! Operation descriptors: one strongly-typed parameter bag per operation kind.
//!
//! [`LayerDescriptor`] is a closed enum so every consumer (negotiation, graph validation, backend
//! workload factories) matches exhaustively over the same set of kinds. Each descriptor knows its
//! arity, how to check a candidate input, and how to derive its output descriptors.

mod activation;
mod convolution;
mod elementwise;
mod normalization;
mod pooling;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use activation::{ActivationDescriptor, ActivationFunction};
pub use convolution::{Convolution2dDescriptor, FilterDims};
pub use elementwise::{ElementwiseUnaryDescriptor, UnaryOperation};
pub use normalization::L2NormalizationDescriptor;
pub use pooling::{PaddingMethod, PoolingAlgorithm, Pooling2dDescriptor};

use crate::error::ValidationError;
use crate::graph::BindingId;
use crate::padding::{OutputShapeRounding, Padding2d, Window2d};
use crate::tensor::shape_helpers::{spatial_dims_or_error, SpatialDims};
use crate::tensor::{DataLayout, TensorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Input,
    Output,
    Pooling2d,
    Convolution2d,
    Activation,
    L2Normalization,
    ElementwiseUnary,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Input => "Input",
            OperationKind::Output => "Output",
            OperationKind::Pooling2d => "Pooling2d",
            OperationKind::Convolution2d => "Convolution2d",
            OperationKind::Activation => "Activation",
            OperationKind::L2Normalization => "L2Normalization",
            OperationKind::ElementwiseUnary => "ElementwiseUnary",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names the caller-visible tensor an `Input` or `Output` layer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingDescriptor {
    pub id: BindingId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerDescriptor {
    Input(BindingDescriptor),
    Output(BindingDescriptor),
    Pooling2d(Pooling2dDescriptor),
    Convolution2d(Convolution2dDescriptor),
    Activation(ActivationDescriptor),
    L2Normalization(L2NormalizationDescriptor),
    ElementwiseUnary(ElementwiseUnaryDescriptor),
}

impl LayerDescriptor {
    pub fn kind(&self) -> OperationKind {
        match self {
            LayerDescriptor::Input(_) => OperationKind::Input,
            LayerDescriptor::Output(_) => OperationKind::Output,
            LayerDescriptor::Pooling2d(_) => OperationKind::Pooling2d,
            LayerDescriptor::Convolution2d(_) => OperationKind::Convolution2d,
            LayerDescriptor::Activation(_) => OperationKind::Activation,
            LayerDescriptor::L2Normalization(_) => OperationKind::L2Normalization,
            LayerDescriptor::ElementwiseUnary(_) => OperationKind::ElementwiseUnary,
        }
    }

    pub fn num_inputs(&self) -> usize {
        match self {
            LayerDescriptor::Input(_) => 0,
            _ => 1,
        }
    }

    pub fn num_outputs(&self) -> usize {
        match self {
            LayerDescriptor::Output(_) => 0,
            _ => 1,
        }
    }

    /// Binding id of an `Input` or `Output` layer.
    pub fn binding_id(&self) -> Option<BindingId> {
        match self {
            LayerDescriptor::Input(binding) | LayerDescriptor::Output(binding) => Some(binding.id),
            _ => None,
        }
    }

    /// Kinds whose workload may apply a trailing activation in the same pass.
    pub fn can_fuse_activation(&self) -> bool {
        matches!(
            self,
            LayerDescriptor::Pooling2d(_) | LayerDescriptor::Convolution2d(_)
        )
    }

    fn data_layout(&self) -> Option<DataLayout> {
        match self {
            LayerDescriptor::Pooling2d(desc) => Some(desc.data_layout),
            LayerDescriptor::Convolution2d(desc) => Some(desc.data_layout),
            LayerDescriptor::L2Normalization(desc) => Some(desc.data_layout),
            _ => None,
        }
    }

    /// Checks the descriptor's own parameters, independent of any tensor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let result = match self {
            LayerDescriptor::Input(_)
            | LayerDescriptor::Output(_)
            | LayerDescriptor::ElementwiseUnary(_) => Ok(()),
            LayerDescriptor::Pooling2d(desc) => desc.validate(),
            LayerDescriptor::Convolution2d(desc) => desc.validate(),
            LayerDescriptor::Activation(desc) => desc.validate(),
            LayerDescriptor::L2Normalization(desc) => desc.validate(),
        };
        result.map_err(|reason| ValidationError::invalid_descriptor(self.kind(), reason))
    }

    /// Checks whether `info` is acceptable on input slot `index`.
    pub fn validate_input(&self, index: usize, info: &TensorInfo) -> Result<(), String> {
        if index >= self.num_inputs() {
            return Err(format!("{} has no input {index}", self.kind()));
        }
        if let Some(layout) = self.data_layout() {
            if info.rank() != 4 {
                return Err(format!(
                    "{} expects a rank-4 input, got {}",
                    self.kind(),
                    info.shape()
                ));
            }
            if info.layout() != layout {
                return Err(format!(
                    "{} is configured for {layout} but the input is {}",
                    self.kind(),
                    info.layout()
                ));
            }
        }
        if let LayerDescriptor::Convolution2d(desc) = self {
            desc.validate_input(info)?;
        }
        Ok(())
    }

    /// Derives the output descriptors from fully static input descriptors.
    pub fn infer_output_infos(
        &self,
        inputs: &[TensorInfo],
    ) -> Result<Vec<TensorInfo>, ValidationError> {
        let kind = self.kind();
        if inputs.len() != self.num_inputs() {
            return Err(ValidationError::ArityMismatch {
                operation: kind,
                expected_inputs: self.num_inputs(),
                actual_inputs: inputs.len(),
                expected_outputs: self.num_outputs(),
                actual_outputs: self.num_outputs(),
            });
        }
        for (index, info) in inputs.iter().enumerate() {
            self.validate_input(index, info)
                .map_err(|reason| ValidationError::shape_inference(kind, reason))?;
        }

        match self {
            LayerDescriptor::Input(_) => Err(ValidationError::shape_inference(
                kind,
                "input layers take their tensor info from the caller",
            )),
            LayerDescriptor::Output(_) => Ok(Vec::new()),
            LayerDescriptor::Pooling2d(desc) => {
                let input = &inputs[0];
                let info = windowed_output(
                    kind,
                    input,
                    &desc.window(),
                    desc.padding,
                    desc.output_shape_rounding,
                    None,
                )?;
                Ok(vec![info])
            }
            LayerDescriptor::Convolution2d(desc) => {
                let input = &inputs[0];
                let window = desc
                    .window()
                    .map_err(|reason| ValidationError::invalid_descriptor(kind, reason))?;
                let filter = desc
                    .filter_dims()
                    .map_err(|reason| ValidationError::invalid_descriptor(kind, reason))?;
                let info = windowed_output(
                    kind,
                    input,
                    &window,
                    desc.padding,
                    OutputShapeRounding::Floor,
                    Some(filter.out_channels),
                )?;
                Ok(vec![info])
            }
            LayerDescriptor::Activation(_)
            | LayerDescriptor::L2Normalization(_)
            | LayerDescriptor::ElementwiseUnary(_) => Ok(vec![inputs[0].clone()]),
        }
    }

    /// Checks `outputs` against what this operation produces from `inputs`.
    ///
    /// Input layers describe themselves and always pass.
    pub fn check_output_infos(
        &self,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Result<(), ValidationError> {
        if let LayerDescriptor::Input(_) = self {
            return Ok(());
        }
        let inferred = self.infer_output_infos(inputs)?;
        compare_output_infos(self.kind(), &inferred, outputs)
    }
}

/// Declared outputs must agree with the inferred ones in shape, dtype and layout. Quantization
/// parameters may differ, as quantized outputs usually carry their own calibrated scale.
pub(crate) fn compare_output_infos(
    kind: OperationKind,
    inferred: &[TensorInfo],
    declared: &[TensorInfo],
) -> Result<(), ValidationError> {
    if inferred.len() != declared.len() {
        return Err(ValidationError::shape_inference(
            kind,
            format!(
                "{} output(s) declared, operation produces {}",
                declared.len(),
                inferred.len()
            ),
        ));
    }
    for (expected, actual) in inferred.iter().zip(declared) {
        if !expected.matches_ignoring_quantization(actual) {
            return Err(ValidationError::shape_inference(
                kind,
                format!("declared output {actual} does not match inferred {expected}"),
            ));
        }
    }
    Ok(())
}

fn windowed_output(
    kind: OperationKind,
    input: &TensorInfo,
    window: &Window2d,
    padding: Padding2d,
    rounding: OutputShapeRounding,
    out_channels: Option<usize>,
) -> Result<TensorInfo, ValidationError> {
    let dims: SpatialDims =
        spatial_dims_or_error(input, |reason| ValidationError::shape_inference(kind, reason))?;
    let pad = window.resolve_padding(padding, dims.height, dims.width)?;
    let (height, width) = window.output_size(dims.height, dims.width, &pad, rounding)?;
    let output = SpatialDims {
        height,
        width,
        channels: out_channels.unwrap_or(dims.channels),
        ..dims
    };
    Ok(input.with_shape(output.to_shape())?)
}

impl From<Pooling2dDescriptor> for LayerDescriptor {
    fn from(desc: Pooling2dDescriptor) -> Self {
        LayerDescriptor::Pooling2d(desc)
    }
}

impl From<Convolution2dDescriptor> for LayerDescriptor {
    fn from(desc: Convolution2dDescriptor) -> Self {
        LayerDescriptor::Convolution2d(desc)
    }
}

impl From<ActivationDescriptor> for LayerDescriptor {
    fn from(desc: ActivationDescriptor) -> Self {
        LayerDescriptor::Activation(desc)
    }
}

impl From<L2NormalizationDescriptor> for LayerDescriptor {
    fn from(desc: L2NormalizationDescriptor) -> Self {
        LayerDescriptor::L2Normalization(desc)
    }
}

impl From<ElementwiseUnaryDescriptor> for LayerDescriptor {
    fn from(desc: ElementwiseUnaryDescriptor) -> Self {
        LayerDescriptor::ElementwiseUnary(desc)
    }
}
