//! Capability negotiation.
//!
//! Negotiation is a pure read over a [`BackendRegistry`]: it never creates layers or workloads, so
//! frontends can ask as often as they like before committing to a graph change.

use std::fmt;

use super::{BackendId, BackendRegistry, LayerSupport};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::layers::{LayerDescriptor, OperationKind};
use crate::tensor::TensorInfo;

/// Everything a backend needs to decide whether it can run one operation.
#[derive(Debug, Clone, Copy)]
pub struct SupportQuery<'a> {
    pub descriptor: &'a LayerDescriptor,
    pub inputs: &'a [TensorInfo],
    pub outputs: &'a [TensorInfo],
}

impl<'a> SupportQuery<'a> {
    pub fn new(
        descriptor: &'a LayerDescriptor,
        inputs: &'a [TensorInfo],
        outputs: &'a [TensorInfo],
    ) -> Self {
        Self {
            descriptor,
            inputs,
            outputs,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.descriptor.kind()
    }
}

/// One backend's reason for declining a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRejection {
    pub backend: BackendId,
    pub reason: String,
}

impl fmt::Display for BackendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.reason)
    }
}

/// Result of walking the priority list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    operation: OperationKind,
    selected: Option<BackendId>,
    rejections: Vec<BackendRejection>,
}

impl NegotiationOutcome {
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn is_supported(&self) -> bool {
        self.selected.is_some()
    }

    /// Backend that accepted the query, if any.
    pub fn selected(&self) -> Option<&BackendId> {
        self.selected.as_ref()
    }

    /// Backends consulted before the selected one (or all of them), with their reasons.
    pub fn rejections(&self) -> &[BackendRejection] {
        &self.rejections
    }

    /// Human-readable summary; never empty when the operation is unsupported.
    pub fn reason(&self) -> String {
        if self.is_supported() {
            return String::new();
        }
        if self.rejections.is_empty() {
            return "no backends were specified".to_string();
        }
        self.rejections
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_result(self) -> EngineResult<BackendId> {
        match self.selected {
            Some(backend) => Ok(backend),
            None => Err(EngineError::Unsupported {
                operation: self.operation,
                reasons: self.rejections,
            }),
        }
    }
}

/// Backend-independent checks run before any backend is consulted: arity, static shapes,
/// descriptor parameters and per-input acceptance.
pub fn prevalidate(query: &SupportQuery<'_>) -> Result<(), ValidationError> {
    let descriptor = query.descriptor;
    let operation = descriptor.kind();
    if query.inputs.len() != descriptor.num_inputs()
        || query.outputs.len() != descriptor.num_outputs()
    {
        return Err(ValidationError::ArityMismatch {
            operation,
            expected_inputs: descriptor.num_inputs(),
            actual_inputs: query.inputs.len(),
            expected_outputs: descriptor.num_outputs(),
            actual_outputs: query.outputs.len(),
        });
    }
    for info in query.inputs.iter().chain(query.outputs) {
        if info.is_dynamic() {
            return Err(ValidationError::DynamicShape {
                operation,
                shape: info.shape().clone(),
            });
        }
    }
    descriptor.validate()?;
    for (index, info) in query.inputs.iter().enumerate() {
        descriptor
            .validate_input(index, info)
            .map_err(|reason| ValidationError::IncompatibleInput {
                operation,
                index,
                reason,
            })?;
    }
    Ok(())
}

/// Asks each backend in `priority` order whether it supports `query`; the first that does wins.
///
/// Validation failures are returned as `Err` before any backend is asked. An unsupported
/// operation is an `Ok` outcome carrying every backend's reason.
pub fn is_operation_supported(
    registry: &BackendRegistry,
    priority: &[BackendId],
    query: &SupportQuery<'_>,
) -> Result<NegotiationOutcome, ValidationError> {
    prevalidate(query)?;

    let operation = query.kind();
    let mut rejections = Vec::new();
    for id in priority {
        let Some(backend) = registry.get(id) else {
            rejections.push(BackendRejection {
                backend: id.clone(),
                reason: "backend not registered".to_string(),
            });
            continue;
        };
        match backend.is_layer_supported(query) {
            LayerSupport::Supported => {
                tracing::debug!(%operation, backend = %id, "backend selected");
                return Ok(NegotiationOutcome {
                    operation,
                    selected: Some(id.clone()),
                    rejections,
                });
            }
            LayerSupport::Unsupported(reason) => {
                let reason = if reason.trim().is_empty() {
                    format!("{operation} is not supported")
                } else {
                    reason
                };
                tracing::trace!(%operation, backend = %id, %reason, "backend declined");
                rejections.push(BackendRejection {
                    backend: id.clone(),
                    reason,
                });
            }
        }
    }

    tracing::debug!(%operation, candidates = priority.len(), "no backend supports operation");
    Ok(NegotiationOutcome {
        operation,
        selected: None,
        rejections,
    })
}
