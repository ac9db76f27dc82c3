//! Backend plug-in contract.
//!
//! A backend answers capability queries for the operation kinds it implements and builds
//! workloads for layers assigned to it. The engine never names concrete backends: it iterates a
//! [`BackendRegistry`] in the caller's priority order.

pub mod registry;
pub mod support;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::layers::{ActivationDescriptor, OperationKind};
use crate::workload::{Workload, WorkloadRequest};

pub use registry::BackendRegistry;
pub use support::{
    is_operation_supported, prevalidate, BackendRejection, NegotiationOutcome, SupportQuery,
};

/// Case-sensitive backend identifier (e.g. `"CpuRef"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(Arc<str>);

impl BackendId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        BackendId::new(name)
    }
}

impl From<String> for BackendId {
    fn from(name: String) -> Self {
        BackendId(Arc::from(name))
    }
}

impl Serialize for BackendId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BackendId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(BackendId::from(name))
    }
}

/// Answer of a single backend to a capability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSupport {
    Supported,
    Unsupported(String),
}

impl LayerSupport {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        LayerSupport::Unsupported(reason.into())
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, LayerSupport::Supported)
    }
}

/// Pluggable execution target.
pub trait Backend: Send + Sync {
    fn id(&self) -> &BackendId;

    /// Decides whether this backend can run `query`. Called only after backend-independent
    /// pre-validation succeeded, so arity and static shapes may be assumed.
    fn is_layer_supported(&self, query: &SupportQuery<'_>) -> LayerSupport;

    /// Returns `true` when workloads of `kind` can apply `activation` in the same pass.
    fn supports_fused_activation(
        &self,
        _kind: OperationKind,
        _activation: &ActivationDescriptor,
    ) -> bool {
        false
    }

    /// Builds the executable unit for a layer bound to this backend.
    fn create_workload(&self, request: WorkloadRequest<'_>) -> EngineResult<Box<dyn Workload>>;
}

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("id", self.id()).finish()
    }
}
