//! Executable units produced once a layer is bound to a backend.
//!
//! A workload has two entry points with the same numeric contract. [`Workload::execute`] runs on
//! the [`TensorHandle`]s bound at construction and needs exclusive access. [`Workload::execute_async`]
//! runs on caller-supplied views and caller-owned [`WorkingMemory`], takes `&self`, and may be
//! called from any number of threads at once.

use crate::backend::BackendId;
use crate::error::EngineResult;
use crate::graph::LayerId;
use crate::layers::{ActivationDescriptor, LayerDescriptor};
use crate::tensor::{TensorHandle, TensorInfo, TensorView, TensorViewMut};

/// Input and output descriptors of one layer instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkloadInfo {
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

impl WorkloadInfo {
    pub fn new(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>) -> Self {
        Self { inputs, outputs }
    }

    /// Checks that views line up with these descriptors one for one, including byte lengths.
    pub fn check_views(
        &self,
        inputs: &[TensorView<'_>],
        outputs: &[TensorViewMut<'_>],
    ) -> Result<(), String> {
        if inputs.len() != self.inputs.len() || outputs.len() != self.outputs.len() {
            return Err(format!(
                "expected {} input(s) and {} output(s), got {} and {}",
                self.inputs.len(),
                self.outputs.len(),
                inputs.len(),
                outputs.len()
            ));
        }
        let pairs = inputs
            .iter()
            .map(|view| (view.info, view.bytes.len()))
            .zip(&self.inputs)
            .chain(
                outputs
                    .iter()
                    .map(|view| (view.info, view.bytes.len()))
                    .zip(&self.outputs),
            );
        for ((actual, len), expected) in pairs {
            if actual != expected {
                return Err(format!("view describes {actual}, workload expects {expected}"));
            }
            let needed = expected.num_bytes().unwrap_or(0);
            if len != needed {
                return Err(format!(
                    "view holds {len} bytes, {expected} needs {needed}"
                ));
            }
        }
        Ok(())
    }
}

/// Caller-owned `f32` scratch handed to [`Workload::execute_async`].
///
/// Sized in elements from [`Workload::working_memory_size`]; one instance per concurrent caller.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    scratch: Vec<f32>,
}

impl WorkingMemory {
    pub fn new(elements: usize) -> Self {
        Self {
            scratch: vec![0.0; elements],
        }
    }

    pub fn len(&self) -> usize {
        self.scratch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scratch.is_empty()
    }

    /// Returns the first `elements` scratch slots, growing the buffer if it is too small.
    pub fn scratch(&mut self, elements: usize) -> &mut [f32] {
        if self.scratch.len() < elements {
            self.scratch.resize(elements, 0.0);
        }
        &mut self.scratch[..elements]
    }
}

/// Everything a backend needs to build a workload for one bound layer.
#[derive(Debug)]
pub struct WorkloadRequest<'a> {
    pub layer: LayerId,
    pub name: &'a str,
    pub descriptor: &'a LayerDescriptor,
    pub info: WorkloadInfo,
    /// Activation to apply in the same pass, already accepted by the backend.
    pub fused_activation: Option<ActivationDescriptor>,
    /// Storage for the synchronous path, one handle per input and output.
    pub inputs: Vec<TensorHandle>,
    pub outputs: Vec<TensorHandle>,
}

/// Backend-bound executable realization of a layer.
pub trait Workload: Send + Sync {
    fn name(&self) -> &str;

    fn backend(&self) -> &BackendId;

    fn info(&self) -> &WorkloadInfo;

    /// Runs on the handles bound at construction. Not reentrant.
    fn execute(&mut self) -> EngineResult<()>;

    /// Runs on caller-supplied views and scratch. Must not touch state outside its arguments.
    fn execute_async(
        &self,
        memory: &mut WorkingMemory,
        inputs: &[TensorView<'_>],
        outputs: &mut [TensorViewMut<'_>],
    ) -> EngineResult<()>;

    /// Scratch elements [`execute_async`](Workload::execute_async) needs.
    fn working_memory_size(&self) -> usize {
        0
    }

    /// `false` when this workload can only run through [`execute`](Workload::execute).
    fn supports_async(&self) -> bool {
        true
    }
}
