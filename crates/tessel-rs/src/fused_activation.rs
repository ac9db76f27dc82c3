//! Post-construction hook attaching a trailing activation to a layer.
//!
//! The activation is fused into the producer when its bound backend can apply it in the same
//! pass. Otherwise a separate `Activation` layer is negotiated and spliced onto the producer's
//! output so every former consumer reads the activated tensor.

use serde::{Deserialize, Serialize};

use crate::backend::{is_operation_supported, BackendId, BackendRegistry, SupportQuery};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::graph::{LayerId, Network};
use crate::layers::{ActivationDescriptor, ActivationFunction, LayerDescriptor};

/// Activation kinds frontends attach to convolution-like operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FusedActivation {
    #[default]
    None,
    Relu,
    Relu6,
    ReluN1To1,
    Sigmoid,
    Tanh,
}

impl FusedActivation {
    pub fn descriptor(self) -> Option<ActivationDescriptor> {
        match self {
            FusedActivation::None => None,
            FusedActivation::Relu => Some(ActivationDescriptor::relu()),
            FusedActivation::Relu6 => Some(ActivationDescriptor::bounded_relu(6.0, 0.0)),
            FusedActivation::ReluN1To1 => Some(ActivationDescriptor::bounded_relu(1.0, -1.0)),
            FusedActivation::Sigmoid => Some(ActivationDescriptor::new(ActivationFunction::Sigmoid)),
            FusedActivation::Tanh => Some(ActivationDescriptor::with_params(
                ActivationFunction::TanH,
                1.0,
                1.0,
            )),
        }
    }
}

/// What the hook did to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    NotRequested,
    /// Recorded on the producer; no layer was added.
    Fused,
    /// A separate activation layer was spliced in.
    Inserted(LayerId),
}

/// Attaches `activation` to output `output_index` of `layer`.
///
/// On failure the network is left exactly as it was.
pub fn apply_fused_activation(
    network: &mut Network,
    registry: &BackendRegistry,
    priority: &[BackendId],
    layer: LayerId,
    output_index: usize,
    activation: FusedActivation,
) -> EngineResult<FusionOutcome> {
    let Some(descriptor) = activation.descriptor() else {
        return Ok(FusionOutcome::NotRequested);
    };

    let producer = network.layer(layer)?;
    let slot = layer.output(output_index);
    let info = network
        .tensor_info(slot)
        .cloned()
        .ok_or(ValidationError::TensorInfoNotSet(slot))?;

    let kind = producer.descriptor().kind();
    let fusable = producer.descriptor().can_fuse_activation()
        && producer
            .backend()
            .and_then(|id| registry.get(id))
            .is_some_and(|backend| backend.supports_fused_activation(kind, &descriptor));
    if fusable {
        network.set_fused_activation(layer, descriptor)?;
        tracing::debug!(%layer, ?activation, "fused activation into producer");
        return Ok(FusionOutcome::Fused);
    }

    let failure = |source: EngineError| {
        EngineError::construction_caused_by(
            format!(
                "could not insert {} activation after {layer}",
                descriptor.function
            ),
            source,
        )
    };

    let activation_layer = LayerDescriptor::Activation(descriptor);
    let infos = [info];
    let query = SupportQuery::new(&activation_layer, &infos, &infos);
    let backend = is_operation_supported(registry, priority, &query)
        .map_err(|err| failure(err.into()))?
        .into_result()
        .map_err(&failure)?;

    let name = format!("{}/activation", producer.name());
    let [info] = infos;
    let inserted = network
        .transaction(|net| -> Result<LayerId, ValidationError> {
            let id = net.add_activation_layer(descriptor, name)?;
            net.bind(id, backend)?;
            net.set_tensor_info(id.output(0), info)?;
            net.move_connections(slot, id.output(0))?;
            net.connect(slot, id.input(0))?;
            Ok(id)
        })
        .map_err(|err| failure(err.into()))?;

    tracing::debug!(%layer, inserted = %inserted, ?activation, "inserted activation layer");
    Ok(FusionOutcome::Inserted(inserted))
}
