//! Error taxonomy shared by negotiation, graph construction and execution.

use thiserror::Error;

use crate::backend::{BackendId, BackendRejection};
use crate::graph::{BindingId, InputSlotId, LayerId, OutputSlotId};
use crate::layers::OperationKind;
use crate::padding::PaddingError;
use crate::quantization::QuantizationError;
use crate::tensor::codec::CodecError;
use crate::tensor::{Shape, TensorInfoError};

/// Problems detected before any backend is consulted or any graph state changes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "{operation} takes {expected_inputs} input(s) and {expected_outputs} output(s), \
         got {actual_inputs} and {actual_outputs}"
    )]
    ArityMismatch {
        operation: OperationKind,
        expected_inputs: usize,
        actual_inputs: usize,
        expected_outputs: usize,
        actual_outputs: usize,
    },
    #[error("{operation}: shape {shape} is not fully known at construction time")]
    DynamicShape { operation: OperationKind, shape: Shape },
    #[error("output slot {0} has no tensor info set")]
    TensorInfoNotSet(OutputSlotId),
    #[error("input slot {input} is already connected to {producer}")]
    AlreadyConnected {
        input: InputSlotId,
        producer: OutputSlotId,
    },
    #[error("connecting {producer} into {consumer} would create a cycle")]
    Cycle { producer: LayerId, consumer: LayerId },
    #[error("{operation} input {index} is not acceptable: {reason}")]
    IncompatibleInput {
        operation: OperationKind,
        index: usize,
        reason: String,
    },
    #[error("{input} rejects its source tensor: {reason}")]
    IncompatibleTensorInfo { input: InputSlotId, reason: String },
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
    #[error("no output slot {0}")]
    NoSuchOutputSlot(OutputSlotId),
    #[error("no input slot {0}")]
    NoSuchInputSlot(InputSlotId),
    #[error("input slot {0} is not connected")]
    Unconnected(InputSlotId),
    #[error("network is finalized and can no longer be modified")]
    Finalized,
    #[error("{layer} is already bound to backend {backend}")]
    AlreadyBound { layer: LayerId, backend: BackendId },
    #[error("{0} has no backend assigned")]
    Unbound(LayerId),
    #[error("{0} is used by more than one input or output layer")]
    DuplicateBinding(BindingId),
    #[error("{0} does not name an input or output of the network")]
    UnknownBinding(BindingId),
    #[error("no data supplied for {0}")]
    MissingBinding(BindingId),
    #[error("network contains workloads that only run synchronously")]
    SyncOnlyNetwork,
    #[error("working memory holds {actual} tensor(s), this network needs {expected}")]
    WorkingMemoryMismatch { expected: usize, actual: usize },
    #[error("invalid {operation} descriptor: {reason}")]
    InvalidDescriptor {
        operation: OperationKind,
        reason: String,
    },
    #[error("cannot infer {operation} output: {reason}")]
    ShapeInference {
        operation: OperationKind,
        reason: String,
    },
    #[error(transparent)]
    Padding(#[from] PaddingError),
    #[error(transparent)]
    TensorInfo(#[from] TensorInfoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ValidationError {
    pub fn invalid_descriptor(operation: OperationKind, reason: impl Into<String>) -> Self {
        ValidationError::InvalidDescriptor {
            operation,
            reason: reason.into(),
        }
    }

    pub fn shape_inference(operation: OperationKind, reason: impl Into<String>) -> Self {
        ValidationError::ShapeInference {
            operation,
            reason: reason.into(),
        }
    }
}

/// Top-level failure returned by every fallible engine entry point.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{operation} is not supported: {}", format_rejections(.reasons))]
    Unsupported {
        operation: OperationKind,
        reasons: Vec<BackendRejection>,
    },
    #[error("construction failed: {reason}")]
    Construction {
        reason: String,
        #[source]
        source: Option<Box<EngineError>>,
    },
    #[error("backend {backend} failed executing {layer}: {message}")]
    Execution {
        backend: BackendId,
        layer: String,
        message: String,
    },
    #[error(transparent)]
    Quantization(#[from] QuantizationError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn construction(reason: impl Into<String>) -> Self {
        EngineError::Construction {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn construction_caused_by(reason: impl Into<String>, source: EngineError) -> Self {
        EngineError::Construction {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn execution(
        backend: &BackendId,
        layer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::Execution {
            backend: backend.clone(),
            layer: layer.into(),
            message: message.into(),
        }
    }

    /// Returns the validation error when this failure was raised before any backend work.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TensorInfoError> for EngineError {
    fn from(err: TensorInfoError) -> Self {
        EngineError::Validation(ValidationError::TensorInfo(err))
    }
}

impl From<PaddingError> for EngineError {
    fn from(err: PaddingError) -> Self {
        EngineError::Validation(ValidationError::Padding(err))
    }
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        EngineError::Validation(ValidationError::Codec(err))
    }
}

fn format_rejections(reasons: &[BackendRejection]) -> String {
    if reasons.is_empty() {
        return "no backends were specified".to_string();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results returned by engine routines.
pub type EngineResult<T> = Result<T, EngineError>;
