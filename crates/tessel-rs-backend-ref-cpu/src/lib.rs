//! Reference CPU backend for tessel-rs.
//!
//! Every operation kind is implemented with plain host loops that compute in `f32`; quantized
//! and half-precision tensors are decoded on the way in and encoded on the way out.

pub mod cpu;
pub mod kernels;
mod workload;

use std::sync::Arc;

use tessel_rs::backend::BackendRegistry;

pub use cpu::{RefBackend, REF_BACKEND_ID};
pub use workload::RefWorkload;

/// Registers the reference backend under [`REF_BACKEND_ID`].
///
/// Registries are explicit values, so callers register into the registry they hand to their
/// sessions instead of relying on a process-wide table.
pub fn register_ref_backend(registry: &mut BackendRegistry) {
    registry.register(Arc::new(RefBackend::new()));
}

/// Convenience for tests and small tools: a registry holding only the reference backend.
pub fn ref_registry() -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::default();
    register_ref_backend(&mut registry);
    Arc::new(registry)
}
