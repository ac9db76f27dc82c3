#![allow(dead_code)]

use std::sync::Arc;

use tessel_rs::backend::SupportQuery;
use tessel_rs::workload::{Workload, WorkloadRequest};
use tessel_rs::{
    Backend, BackendId, BackendRegistry, DType, EngineError, EngineResult, LayerSupport,
    OperationKind, TensorInfo,
};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend that only answers capability queries for a fixed set of kinds.
#[derive(Debug)]
pub struct StubBackend {
    id: BackendId,
    kinds: Vec<OperationKind>,
    reason: String,
}

impl StubBackend {
    pub fn new(id: &str, kinds: &[OperationKind]) -> Self {
        Self {
            id: BackendId::new(id),
            kinds: kinds.to_vec(),
            reason: format!("{id} only implements {kinds:?}"),
        }
    }

    /// Declines with an empty reason, which negotiation must replace.
    pub fn silent(mut self) -> Self {
        self.reason.clear();
        self
    }
}

impl Backend for StubBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn is_layer_supported(&self, query: &SupportQuery<'_>) -> LayerSupport {
        if self.kinds.contains(&query.kind()) {
            LayerSupport::Supported
        } else {
            LayerSupport::Unsupported(self.reason.clone())
        }
    }

    fn create_workload(&self, request: WorkloadRequest<'_>) -> EngineResult<Box<dyn Workload>> {
        Err(EngineError::construction(format!(
            "{} cannot build workloads ({})",
            self.id, request.name
        )))
    }
}

pub fn registry_with(backends: Vec<Arc<dyn Backend>>) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::default();
    for backend in backends {
        registry.register(backend);
    }
    Arc::new(registry)
}

pub fn f32_info(dims: [usize; 4]) -> TensorInfo {
    TensorInfo::new(dims, DType::Float32).expect("static f32 descriptor")
}
