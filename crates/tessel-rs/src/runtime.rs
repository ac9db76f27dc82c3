//! Loaded networks: workloads in dependency order plus the tensors bound to them.

use std::collections::HashMap;

use crate::backend::BackendRegistry;
use crate::config::ExecutionMode;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::graph::{BindingId, LayerId, Network, OutputSlotId};
use crate::layers::LayerDescriptor;
use crate::tensor::codec;
use crate::tensor::{TensorHandle, TensorInfo, TensorInfoError, TensorView, TensorViewMut};
use crate::workload::{Workload, WorkingMemory, WorkloadInfo, WorkloadRequest};

struct Step {
    layer: LayerId,
    workload: Box<dyn Workload>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
}

/// Executable form of a finalized [`Network`].
///
/// Every output slot of the network owns one [`TensorHandle`]; workloads built for the
/// synchronous path read and write those handles directly. The asynchronous path ignores them and
/// works entirely inside a caller-owned [`NetworkWorkingMemory`].
pub struct LoadedNetwork {
    mode: ExecutionMode,
    tensors: Vec<TensorHandle>,
    steps: Vec<Step>,
    inputs: Vec<(BindingId, usize)>,
    outputs: Vec<(BindingId, usize)>,
    scratch_elements: usize,
    async_capable: bool,
}

/// Per-caller storage for [`LoadedNetwork::execute_async`]: one buffer per intermediate tensor plus
/// shared kernel scratch.
#[derive(Debug, Clone)]
pub struct NetworkWorkingMemory {
    tensors: Vec<Vec<u8>>,
    scratch: WorkingMemory,
}

impl NetworkWorkingMemory {
    /// Total bytes of tensor storage held.
    pub fn tensor_bytes(&self) -> usize {
        self.tensors.iter().map(Vec::len).sum()
    }

    pub fn scratch_elements(&self) -> usize {
        self.scratch.len()
    }
}

impl LoadedNetwork {
    /// Builds workloads for every bound layer of a finalized network.
    pub fn new(
        network: &Network,
        registry: &BackendRegistry,
        mode: ExecutionMode,
    ) -> EngineResult<Self> {
        if !network.is_finalized() {
            return Err(EngineError::construction(
                "network must be finalized before it is loaded",
            ));
        }
        let order = network.topological_order()?;

        let mut tensors = Vec::new();
        let mut slots: HashMap<OutputSlotId, usize> = HashMap::new();
        for &id in &order {
            let layer = network.layer(id)?;
            for (index, slot) in layer.outputs().iter().enumerate() {
                let output = id.output(index);
                let info = slot
                    .info()
                    .cloned()
                    .ok_or(ValidationError::TensorInfoNotSet(output))?;
                slots.insert(output, tensors.len());
                tensors.push(TensorHandle::allocate(info)?);
            }
        }

        let mut steps = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for &id in &order {
            let layer = network.layer(id)?;
            let sources = layer
                .inputs()
                .iter()
                .enumerate()
                .map(|(index, source)| {
                    source
                        .and_then(|slot| slots.get(&slot).copied())
                        .ok_or(ValidationError::Unconnected(id.input(index)))
                })
                .collect::<Result<Vec<_>, _>>()?;

            match layer.descriptor() {
                LayerDescriptor::Input(binding) => {
                    inputs.push((binding.id, slots[&id.output(0)]));
                    continue;
                }
                LayerDescriptor::Output(binding) => {
                    outputs.push((binding.id, sources[0]));
                    continue;
                }
                _ => {}
            }

            let backend_id = layer.backend().ok_or(ValidationError::Unbound(id))?;
            let backend = registry.get(backend_id).ok_or_else(|| {
                EngineError::construction(format!(
                    "{id} is bound to backend {backend_id}, which is not registered"
                ))
            })?;
            let results: Vec<usize> = (0..layer.outputs().len())
                .map(|index| slots[&id.output(index)])
                .collect();

            let info = WorkloadInfo::new(
                sources.iter().map(|&t| tensors[t].info().clone()).collect(),
                results.iter().map(|&t| tensors[t].info().clone()).collect(),
            );
            let request = WorkloadRequest {
                layer: id,
                name: layer.name(),
                descriptor: layer.descriptor(),
                info,
                fused_activation: layer.fused_activation().copied(),
                inputs: sources.iter().map(|&t| tensors[t].clone()).collect(),
                outputs: results.iter().map(|&t| tensors[t].clone()).collect(),
            };
            let workload = backend.create_workload(request)?;
            if mode == ExecutionMode::Async && !workload.supports_async() {
                return Err(EngineError::construction(format!(
                    "{} workload for {id} on {backend_id} cannot run asynchronously",
                    layer.descriptor().kind()
                )));
            }
            steps.push(Step {
                layer: id,
                workload,
                inputs: sources,
                outputs: results,
            });
        }

        let scratch_elements = steps
            .iter()
            .map(|step| step.workload.working_memory_size())
            .max()
            .unwrap_or(0);
        let async_capable = steps.iter().all(|step| step.workload.supports_async());
        tracing::debug!(
            workloads = steps.len(),
            tensors = tensors.len(),
            scratch_elements,
            %mode,
            "loaded network"
        );

        Ok(Self {
            mode,
            tensors,
            steps,
            inputs,
            outputs,
            scratch_elements,
            async_capable,
        })
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn workload_count(&self) -> usize {
        self.steps.len()
    }

    /// Layers with a workload, in execution order.
    pub fn execution_order(&self) -> Vec<LayerId> {
        self.steps.iter().map(|step| step.layer).collect()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &dyn Workload> {
        self.steps.iter().map(|step| step.workload.as_ref())
    }

    pub fn input_info(&self, binding: BindingId) -> EngineResult<&TensorInfo> {
        let index = find(&self.inputs, binding)?;
        Ok(self.tensors[index].info())
    }

    pub fn output_info(&self, binding: BindingId) -> EngineResult<&TensorInfo> {
        let index = find(&self.outputs, binding)?;
        Ok(self.tensors[index].info())
    }

    /// Copies raw element bytes into the storage behind an input binding.
    pub fn set_input(&self, binding: BindingId, bytes: &[u8]) -> EngineResult<()> {
        let index = find(&self.inputs, binding)?;
        self.tensors[index].copy_from_slice(bytes)?;
        Ok(())
    }

    /// Encodes `values` with the input's dtype and quantization, then stores them.
    pub fn set_input_f32(&self, binding: BindingId, values: &[f32]) -> EngineResult<()> {
        let info = self.input_info(binding)?;
        let bytes = codec::from_f32_slice(info, values)?;
        self.set_input(binding, &bytes)
    }

    pub fn read_output(&self, binding: BindingId) -> EngineResult<Vec<u8>> {
        let index = find(&self.outputs, binding)?;
        Ok(self.tensors[index].to_vec())
    }

    pub fn read_output_f32(&self, binding: BindingId) -> EngineResult<Vec<f32>> {
        let index = find(&self.outputs, binding)?;
        let handle = &self.tensors[index];
        let bytes = handle.read();
        Ok(codec::to_f32_vec(handle.info(), &bytes)?)
    }

    /// Runs every workload once on the bound tensors.
    pub fn execute(&mut self) -> EngineResult<()> {
        for step in &mut self.steps {
            let span = tracing::debug_span!(
                "workload",
                layer = %step.layer,
                name = step.workload.name(),
                backend = %step.workload.backend()
            );
            let _enter = span.enter();
            step.workload.execute()?;
        }
        Ok(())
    }

    /// Allocates per-caller storage sized for [`execute_async`](Self::execute_async).
    pub fn create_working_memory(&self) -> NetworkWorkingMemory {
        NetworkWorkingMemory {
            tensors: self
                .tensors
                .iter()
                .map(|handle| vec![0u8; handle.len()])
                .collect(),
            scratch: WorkingMemory::new(self.scratch_elements),
        }
    }

    /// Runs the network on caller buffers.
    ///
    /// Each concurrent caller must pass its own `memory`; nothing else is written, so any number
    /// of threads may share one `LoadedNetwork`.
    pub fn execute_async(
        &self,
        memory: &mut NetworkWorkingMemory,
        inputs: &[(BindingId, &[u8])],
        outputs: &mut [(BindingId, &mut [u8])],
    ) -> EngineResult<()> {
        if !self.async_capable {
            return Err(ValidationError::SyncOnlyNetwork.into());
        }
        if memory.tensors.len() != self.tensors.len() {
            return Err(ValidationError::WorkingMemoryMismatch {
                expected: self.tensors.len(),
                actual: memory.tensors.len(),
            }
            .into());
        }
        self.check_async_bindings(inputs, outputs)?;

        for &(binding, index) in &self.inputs {
            let bytes = inputs
                .iter()
                .find(|(id, _)| *id == binding)
                .map(|(_, bytes)| *bytes)
                .ok_or(ValidationError::MissingBinding(binding))?;
            copy_checked(&mut memory.tensors[index], bytes)?;
        }

        for step in &self.steps {
            let span = tracing::debug_span!(
                "workload_async",
                layer = %step.layer,
                name = step.workload.name(),
                backend = %step.workload.backend()
            );
            let _enter = span.enter();

            let mut results: Vec<Vec<u8>> = step
                .outputs
                .iter()
                .map(|&index| std::mem::take(&mut memory.tensors[index]))
                .collect();
            let input_views: Vec<TensorView<'_>> = step
                .inputs
                .iter()
                .map(|&index| TensorView::new(self.tensors[index].info(), &memory.tensors[index]))
                .collect();
            let mut output_views: Vec<TensorViewMut<'_>> = step
                .outputs
                .iter()
                .zip(results.iter_mut())
                .map(|(&index, bytes)| TensorViewMut::new(self.tensors[index].info(), bytes))
                .collect();
            let result =
                step.workload
                    .execute_async(&mut memory.scratch, &input_views, &mut output_views);
            drop(output_views);
            drop(input_views);
            for (&index, bytes) in step.outputs.iter().zip(results) {
                memory.tensors[index] = bytes;
            }
            result?;
        }

        for (binding, dest) in outputs.iter_mut() {
            let index = find(&self.outputs, *binding)?;
            dest.copy_from_slice(&memory.tensors[index]);
        }
        Ok(())
    }

    /// Every caller binding must name a network binding of the right size, and every network
    /// binding must be supplied. Checked up front so no workload runs on a call that would fail.
    fn check_async_bindings(
        &self,
        inputs: &[(BindingId, &[u8])],
        outputs: &[(BindingId, &mut [u8])],
    ) -> EngineResult<()> {
        let inputs: Vec<(BindingId, usize)> =
            inputs.iter().map(|(id, bytes)| (*id, bytes.len())).collect();
        let outputs: Vec<(BindingId, usize)> =
            outputs.iter().map(|(id, bytes)| (*id, bytes.len())).collect();
        check_supplied(&self.tensors, &self.inputs, &inputs)?;
        check_supplied(&self.tensors, &self.outputs, &outputs)
    }
}

fn check_supplied(
    tensors: &[TensorHandle],
    bindings: &[(BindingId, usize)],
    caller: &[(BindingId, usize)],
) -> EngineResult<()> {
    for &(binding, len) in caller {
        let expected = tensors[find(bindings, binding)?].len();
        if len != expected {
            return Err(EngineError::from(TensorInfoError::ByteLength {
                expected,
                actual: len,
            }));
        }
    }
    match bindings
        .iter()
        .find(|(binding, _)| !caller.iter().any(|(id, _)| id == binding))
    {
        Some(&(binding, _)) => Err(ValidationError::MissingBinding(binding).into()),
        None => Ok(()),
    }
}

fn find(bindings: &[(BindingId, usize)], binding: BindingId) -> EngineResult<usize> {
    bindings
        .iter()
        .find(|(id, _)| *id == binding)
        .map(|(_, index)| *index)
        .ok_or_else(|| ValidationError::UnknownBinding(binding).into())
}

fn copy_checked(dest: &mut [u8], source: &[u8]) -> EngineResult<()> {
    if dest.len() != source.len() {
        return Err(EngineError::from(TensorInfoError::ByteLength {
            expected: dest.len(),
            actual: source.len(),
        }));
    }
    dest.copy_from_slice(source);
    Ok(())
}

impl std::fmt::Debug for LoadedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedNetwork")
            .field("mode", &self.mode)
            .field("workloads", &self.execution_order())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
