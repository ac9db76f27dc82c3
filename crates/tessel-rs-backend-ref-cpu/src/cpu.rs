use tessel_rs::backend::{Backend, BackendId, LayerSupport, SupportQuery};
use tessel_rs::error::EngineResult;
use tessel_rs::layers::{ActivationDescriptor, LayerDescriptor, OperationKind, UnaryOperation};
use tessel_rs::tensor::{DType, TensorInfo};
use tessel_rs::workload::{Workload, WorkloadRequest};

use crate::workload::RefWorkload;

pub const REF_BACKEND_ID: &str = "CpuRef";

/// Element types the reference kernels accept for activations.
const SUPPORTED_TYPES: [DType; 4] = [
    DType::Float32,
    DType::Float16,
    DType::QAsymmU8,
    DType::QAsymmS8,
];

/// Portable host backend that implements every operation kind with straightforward loops.
///
/// It is the correctness baseline other backends are compared against, not a fast path.
#[derive(Debug, Clone)]
pub struct RefBackend {
    id: BackendId,
    fuse_activations: bool,
}

impl RefBackend {
    pub fn new() -> Self {
        Self {
            id: BackendId::new(REF_BACKEND_ID),
            fuse_activations: true,
        }
    }

    /// A variant that never fuses activations, so frontends see a separate activation layer.
    pub fn without_fusion() -> Self {
        Self {
            fuse_activations: false,
            ..Self::new()
        }
    }

    /// Registers under a different id, e.g. to stand in for a second device in tests.
    pub fn with_id(mut self, id: impl Into<BackendId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn fuses_activations(&self) -> bool {
        self.fuse_activations
    }
}

impl Default for RefBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_type(kind: OperationKind, what: &str, info: &TensorInfo) -> Result<(), String> {
    if SUPPORTED_TYPES.contains(&info.dtype()) {
        Ok(())
    } else {
        Err(format!(
            "Reference {kind}: {what} type {} is not supported.",
            info.dtype()
        ))
    }
}

fn check_same_type(kind: OperationKind, input: &TensorInfo, output: &TensorInfo) -> Result<(), String> {
    if input.dtype() != output.dtype() {
        return Err(format!(
            "Reference {kind}: input and output types are mismatched ({} vs {}).",
            input.dtype(),
            output.dtype()
        ));
    }
    Ok(())
}

fn check_convolution_operands(
    query: &SupportQuery<'_>,
    weights: &TensorInfo,
    bias: Option<&TensorInfo>,
) -> Result<(), String> {
    let kind = OperationKind::Convolution2d;
    let input = query.inputs[0].dtype();
    let weights_ok = if input.is_float() {
        weights.dtype() == input
    } else {
        matches!(
            weights.dtype(),
            DType::QAsymmU8 | DType::QAsymmS8 | DType::QSymmS8
        )
    };
    if !weights_ok {
        return Err(format!(
            "Reference {kind}: {} weights are not supported with a {input} input.",
            weights.dtype()
        ));
    }
    if let Some(bias) = bias {
        let expected = if input.is_float() { input } else { DType::Signed32 };
        if bias.dtype() != expected {
            return Err(format!(
                "Reference {kind}: bias must be {expected} for a {input} input, got {}.",
                bias.dtype()
            ));
        }
    }
    Ok(())
}

fn check_query(query: &SupportQuery<'_>) -> Result<(), String> {
    let kind = query.kind();
    let (Some(input), Some(output)) = (query.inputs.first(), query.outputs.first()) else {
        return Ok(());
    };
    check_type(kind, "input", input)?;
    check_type(kind, "output", output)?;
    check_same_type(kind, input, output)?;
    match query.descriptor {
        LayerDescriptor::Convolution2d(desc) => check_convolution_operands(
            query,
            desc.weights.info(),
            desc.bias.as_ref().map(|bias| bias.info()),
        ),
        LayerDescriptor::ElementwiseUnary(desc)
            if input.dtype().is_quantized()
                && matches!(desc.operation, UnaryOperation::Log | UnaryOperation::Rsqrt) =>
        {
            Err(format!(
                "Reference {kind}: {} is only supported for float tensors.",
                desc.operation
            ))
        }
        _ => Ok(()),
    }
}

impl Backend for RefBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn is_layer_supported(&self, query: &SupportQuery<'_>) -> LayerSupport {
        match check_query(query) {
            Ok(()) => LayerSupport::Supported,
            Err(reason) => {
                tracing::trace!(backend = %self.id, kind = %query.kind(), %reason, "declined");
                LayerSupport::Unsupported(reason)
            }
        }
    }

    fn supports_fused_activation(
        &self,
        kind: OperationKind,
        activation: &ActivationDescriptor,
    ) -> bool {
        self.fuse_activations
            && activation.validate().is_ok()
            && matches!(
                kind,
                OperationKind::Pooling2d | OperationKind::Convolution2d
            )
    }

    fn create_workload(&self, request: WorkloadRequest<'_>) -> EngineResult<Box<dyn Workload>> {
        let workload = RefWorkload::new(self.id.clone(), request)?;
        Ok(Box::new(workload))
    }
}
