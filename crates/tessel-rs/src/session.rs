//! Frontend-facing graph construction.
//!
//! A [`Session`] owns one [`Network`], the shared [`BackendRegistry`] and the configured backend
//! priority list. Each `add_*` call negotiates a backend, creates and binds the layer, describes
//! its outputs, connects its inputs and runs the fused activation hook as one transaction: if any
//! step fails the network is left as it was before the call.

use std::sync::Arc;

use crate::backend::{
    is_operation_supported, BackendId, BackendRegistry, NegotiationOutcome, SupportQuery,
};
use crate::config::EngineConfig;
use crate::error::{EngineResult, ValidationError};
use crate::fused_activation::{apply_fused_activation, FusedActivation, FusionOutcome};
use crate::graph::{BindingId, LayerId, Network, OutputSlotId};
use crate::layers::{
    compare_output_infos, ActivationDescriptor, Convolution2dDescriptor, ElementwiseUnaryDescriptor,
    L2NormalizationDescriptor, LayerDescriptor, OperationKind, Pooling2dDescriptor,
};
use crate::runtime::LoadedNetwork;
use crate::tensor::TensorInfo;

/// Result of adding an operation through a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub layer: LayerId,
    pub backend: BackendId,
    pub fusion: FusionOutcome,
}

impl OperationHandle {
    /// Slot downstream layers should read: the inserted activation's output when one was spliced
    /// in, the layer's own first output otherwise.
    pub fn output(&self) -> OutputSlotId {
        match self.fusion {
            FusionOutcome::Inserted(activation) => activation.output(0),
            FusionOutcome::NotRequested | FusionOutcome::Fused => self.layer.output(0),
        }
    }
}

pub struct Session {
    registry: Arc<BackendRegistry>,
    config: EngineConfig,
    network: Network,
}

impl Session {
    pub fn new(registry: Arc<BackendRegistry>, config: EngineConfig) -> Self {
        tracing::debug!(
            backends = ?config.backends,
            mode = %config.execution_mode,
            "session created"
        );
        Self {
            registry,
            config,
            network: Network::new(),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn priority(&self) -> &[BackendId] {
        &self.config.backends
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Validation-only capability query; never touches the network.
    pub fn is_supported(
        &self,
        descriptor: &LayerDescriptor,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Result<NegotiationOutcome, ValidationError> {
        let query = SupportQuery::new(descriptor, inputs, outputs);
        is_operation_supported(&self.registry, &self.config.backends, &query)
    }

    /// Adds a network input described by `info`.
    pub fn add_input(
        &mut self,
        binding: BindingId,
        info: TensorInfo,
        name: impl Into<String>,
    ) -> EngineResult<LayerId> {
        if info.is_dynamic() {
            return Err(ValidationError::DynamicShape {
                operation: OperationKind::Input,
                shape: info.shape().clone(),
            }
            .into());
        }
        let name = name.into();
        self.network.transaction(|net| -> EngineResult<LayerId> {
            let id = net.add_input_layer(binding, name)?;
            net.set_tensor_info(id.output(0), info)?;
            Ok(id)
        })
    }

    /// Marks `source` as a network output.
    pub fn add_output(
        &mut self,
        binding: BindingId,
        source: OutputSlotId,
        name: impl Into<String>,
    ) -> EngineResult<LayerId> {
        let name = name.into();
        self.network.transaction(|net| -> EngineResult<LayerId> {
            let id = net.add_output_layer(binding, name)?;
            net.connect(source, id.input(0))?;
            Ok(id)
        })
    }

    /// Adds an operation whose output descriptors are inferred from its inputs.
    pub fn add_operation(
        &mut self,
        descriptor: impl Into<LayerDescriptor>,
        inputs: &[OutputSlotId],
        activation: FusedActivation,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation_inner(descriptor.into(), inputs, None, activation, name.into())
    }

    /// Adds an operation with caller-declared output descriptors.
    ///
    /// Declared shapes, dtypes and layouts must match what the operation produces; quantization parameters
    /// may differ, as quantized outputs usually carry their own calibrated scale.
    pub fn add_operation_with_outputs(
        &mut self,
        descriptor: impl Into<LayerDescriptor>,
        inputs: &[OutputSlotId],
        outputs: Vec<TensorInfo>,
        activation: FusedActivation,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation_inner(
            descriptor.into(),
            inputs,
            Some(outputs),
            activation,
            name.into(),
        )
    }

    fn add_operation_inner(
        &mut self,
        descriptor: LayerDescriptor,
        inputs: &[OutputSlotId],
        declared: Option<Vec<TensorInfo>>,
        activation: FusedActivation,
        name: String,
    ) -> EngineResult<OperationHandle> {
        let kind = descriptor.kind();
        if matches!(kind, OperationKind::Input | OperationKind::Output) {
            return Err(ValidationError::invalid_descriptor(
                kind,
                "use add_input / add_output for network bindings",
            )
            .into());
        }
        if activation != FusedActivation::None && !descriptor.can_fuse_activation() {
            return Err(ValidationError::invalid_descriptor(
                kind,
                "operation cannot carry a fused activation",
            )
            .into());
        }

        let input_infos = inputs
            .iter()
            .map(|slot| {
                self.network
                    .tensor_info(*slot)
                    .cloned()
                    .ok_or(ValidationError::TensorInfoNotSet(*slot))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(info) = input_infos.iter().find(|info| info.is_dynamic()) {
            return Err(ValidationError::DynamicShape {
                operation: kind,
                shape: info.shape().clone(),
            }
            .into());
        }

        let inferred = descriptor.infer_output_infos(&input_infos)?;
        let output_infos = match declared {
            Some(declared) => {
                compare_output_infos(kind, &inferred, &declared)?;
                declared
            }
            None => inferred,
        };

        let query = SupportQuery::new(&descriptor, &input_infos, &output_infos);
        let backend = is_operation_supported(&self.registry, &self.config.backends, &query)?
            .into_result()?;

        let registry = Arc::clone(&self.registry);
        let priority = self.config.backends.clone();
        let selected = backend.clone();
        let (layer, fusion) = self
            .network
            .transaction(|net| -> EngineResult<(LayerId, FusionOutcome)> {
                let id = net.add_layer(descriptor, name)?;
                net.bind(id, selected)?;
                for (index, info) in output_infos.into_iter().enumerate() {
                    net.set_tensor_info(id.output(index), info)?;
                }
                for (index, source) in inputs.iter().enumerate() {
                    net.connect(*source, id.input(index))?;
                }
                let fusion = apply_fused_activation(net, &registry, &priority, id, 0, activation)?;
                Ok((id, fusion))
            })?;

        tracing::debug!(%layer, %kind, %backend, ?fusion, "added operation");
        Ok(OperationHandle {
            layer,
            backend,
            fusion,
        })
    }

    pub fn add_pooling2d(
        &mut self,
        descriptor: Pooling2dDescriptor,
        input: OutputSlotId,
        activation: FusedActivation,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation(descriptor, &[input], activation, name)
    }

    pub fn add_convolution2d(
        &mut self,
        descriptor: Convolution2dDescriptor,
        input: OutputSlotId,
        activation: FusedActivation,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation(descriptor, &[input], activation, name)
    }

    pub fn add_activation(
        &mut self,
        descriptor: ActivationDescriptor,
        input: OutputSlotId,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation(descriptor, &[input], FusedActivation::None, name)
    }

    pub fn add_l2_normalization(
        &mut self,
        descriptor: L2NormalizationDescriptor,
        input: OutputSlotId,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation(descriptor, &[input], FusedActivation::None, name)
    }

    pub fn add_elementwise_unary(
        &mut self,
        descriptor: ElementwiseUnaryDescriptor,
        input: OutputSlotId,
        name: impl Into<String>,
    ) -> EngineResult<OperationHandle> {
        self.add_operation(descriptor, &[input], FusedActivation::None, name)
    }

    /// Finalizes the network and builds its workloads for the configured execution mode.
    pub fn load(&mut self) -> EngineResult<LoadedNetwork> {
        self.network.finalize()?;
        LoadedNetwork::new(&self.network, &self.registry, self.config.execution_mode)
    }
}
