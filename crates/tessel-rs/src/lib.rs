//! Hardware-abstracted neural-network execution engine.
//!
//! Frontends describe a graph of typed tensor operations through a [`Session`], which negotiates
//! a backend for every operation, binds the resulting layers, and loads the graph into a
//! [`LoadedNetwork`] of executable workloads. Backends plug in through the [`Backend`] trait and
//! are offered to sessions through an explicit [`BackendRegistry`].

pub mod backend;
pub mod config;
pub mod error;
pub mod fused_activation;
pub mod graph;
pub mod layers;
pub mod padding;
pub mod quantization;
pub mod runtime;
pub mod session;
pub mod tensor;
pub mod workload;

pub use backend::{Backend, BackendId, BackendRegistry, LayerSupport, NegotiationOutcome};
pub use config::{EngineConfig, ExecutionMode};
pub use error::{EngineError, EngineResult, ValidationError};
pub use fused_activation::{FusedActivation, FusionOutcome};
pub use graph::{BindingId, LayerId, Network};
pub use layers::{LayerDescriptor, OperationKind};
pub use runtime::{LoadedNetwork, NetworkWorkingMemory};
pub use session::{OperationHandle, Session};
pub use tensor::{DType, DataLayout, QuantizationInfo, Shape, TensorInfo};
pub use workload::{Workload, WorkingMemory, WorkloadInfo};
