//! A third-party backend whose workloads only implement the synchronous entry point.

mod common;

use std::sync::Arc;

use anyhow::Result;
use tessel_rs::backend::SupportQuery;
use tessel_rs::layers::{ActivationDescriptor, LayerDescriptor};
use tessel_rs::tensor::{codec, TensorHandle, TensorView, TensorViewMut};
use tessel_rs::workload::{Workload, WorkingMemory, WorkloadInfo, WorkloadRequest};
use tessel_rs::{
    Backend, BackendId, BindingId, EngineConfig, EngineError, EngineResult, ExecutionMode,
    LayerSupport, Session, ValidationError,
};

use common::{f32_info, registry_with};

struct DoublingWorkload {
    name: String,
    backend: BackendId,
    info: WorkloadInfo,
    input: TensorHandle,
    output: TensorHandle,
}

impl Workload for DoublingWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &BackendId {
        &self.backend
    }

    fn info(&self) -> &WorkloadInfo {
        &self.info
    }

    fn execute(&mut self) -> EngineResult<()> {
        let values = codec::to_f32_vec(self.input.info(), &self.input.read())?;
        let doubled: Vec<f32> = values.iter().map(|v| v * 2.0).collect();
        let bytes = codec::from_f32_slice(self.output.info(), &doubled)?;
        self.output.copy_from_slice(&bytes)?;
        Ok(())
    }

    fn execute_async(
        &self,
        _memory: &mut WorkingMemory,
        _inputs: &[TensorView<'_>],
        _outputs: &mut [TensorViewMut<'_>],
    ) -> EngineResult<()> {
        Err(EngineError::execution(&self.backend, &self.name, "synchronous only"))
    }

    fn supports_async(&self) -> bool {
        false
    }
}

/// Implements every activation as "multiply by two"; good enough to observe which path ran.
struct DoublingBackend {
    id: BackendId,
}

impl Backend for DoublingBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn is_layer_supported(&self, query: &SupportQuery<'_>) -> LayerSupport {
        match query.descriptor {
            LayerDescriptor::Activation(_) => LayerSupport::Supported,
            _ => LayerSupport::unsupported("only activations"),
        }
    }

    fn create_workload(&self, request: WorkloadRequest<'_>) -> EngineResult<Box<dyn Workload>> {
        let mut inputs = request.inputs.into_iter();
        let mut outputs = request.outputs.into_iter();
        let (Some(input), Some(output)) = (inputs.next(), outputs.next()) else {
            return Err(EngineError::construction("activation needs one input and one output"));
        };
        Ok(Box::new(DoublingWorkload {
            name: request.name.to_string(),
            backend: self.id.clone(),
            info: request.info,
            input,
            output,
        }))
    }
}

fn build(mode: ExecutionMode) -> Result<Session> {
    let registry = registry_with(vec![Arc::new(DoublingBackend {
        id: BackendId::new("Doubling"),
    })]);
    let mut session = Session::new(
        registry,
        EngineConfig::new(["Doubling"]).with_execution_mode(mode),
    );
    let input = session.add_input(BindingId(0), f32_info([1, 1, 1, 3]), "input")?;
    let act = session.add_activation(ActivationDescriptor::relu(), input.output(0), "act")?;
    session.add_output(BindingId(0), act.output(), "output")?;
    Ok(session)
}

#[test]
fn sync_mode_runs_bound_handles() -> Result<()> {
    let mut network = build(ExecutionMode::Sync)?.load()?;
    network.set_input_f32(BindingId(0), &[1.0, -2.0, 0.5])?;
    network.execute()?;
    assert_eq!(network.read_output_f32(BindingId(0))?, vec![2.0, -4.0, 1.0]);
    Ok(())
}

#[test]
fn async_mode_rejects_sync_only_workloads_at_load() -> Result<()> {
    let err = build(ExecutionMode::Async)?.load().unwrap_err();
    assert!(matches!(err, EngineError::Construction { .. }));
    assert!(err.to_string().contains("asynchronously"));
    Ok(())
}

#[test]
fn sync_loaded_network_refuses_async_calls() -> Result<()> {
    let network = build(ExecutionMode::Sync)?.load()?;
    let mut memory = network.create_working_memory();
    let input = vec![0u8; 12];
    let mut output = vec![0u8; 12];
    let err = network
        .execute_async(
            &mut memory,
            &[(BindingId(0), input.as_slice())],
            &mut [(BindingId(0), output.as_mut_slice())],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::SyncOnlyNetwork)
    ));
    Ok(())
}
