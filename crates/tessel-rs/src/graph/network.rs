use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::layer::{Layer, LayerBinding, OutputSlot};
use super::{BindingId, InputSlotId, LayerId, OutputSlotId};
use crate::backend::BackendId;
use crate::error::ValidationError;
use crate::layers::{
    ActivationDescriptor, BindingDescriptor, Convolution2dDescriptor, ElementwiseUnaryDescriptor,
    L2NormalizationDescriptor, LayerDescriptor, OperationKind, Pooling2dDescriptor,
};
use crate::tensor::TensorInfo;

/// Arena-owned layer graph.
///
/// Layers are addressed by [`LayerId`] and never removed, so ids handed out stay valid for the
/// lifetime of the network. Edges are stored twice: each input slot names its producer and each
/// output slot lists its consumers.
#[derive(Debug, Clone, Default)]
pub struct Network {
    layers: Vec<Layer>,
    finalized: bool,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer, ValidationError> {
        self.layers
            .get(id.0)
            .ok_or(ValidationError::UnknownLayer(id))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, ValidationError> {
        self.layers
            .get_mut(id.0)
            .ok_or(ValidationError::UnknownLayer(id))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn ensure_mutable(&self) -> Result<(), ValidationError> {
        if self.finalized {
            return Err(ValidationError::Finalized);
        }
        Ok(())
    }

    /// Adds a layer for any operation kind after validating its descriptor.
    pub fn add_layer(
        &mut self,
        descriptor: impl Into<LayerDescriptor>,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.ensure_mutable()?;
        let descriptor = descriptor.into();
        descriptor.validate()?;
        if let Some(binding) = descriptor.binding_id() {
            let kind = descriptor.kind();
            let taken = self.layers.iter().any(|layer| {
                layer.descriptor.kind() == kind && layer.descriptor.binding_id() == Some(binding)
            });
            if taken {
                return Err(ValidationError::DuplicateBinding(binding));
            }
        }

        let id = LayerId(self.layers.len());
        let name = name.into();
        tracing::trace!(layer = %id, kind = %descriptor.kind(), name = %name, "added layer");
        self.layers.push(Layer::new(id, name, descriptor));
        Ok(id)
    }

    pub fn add_input_layer(
        &mut self,
        binding: BindingId,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(LayerDescriptor::Input(BindingDescriptor { id: binding }), name)
    }

    pub fn add_output_layer(
        &mut self,
        binding: BindingId,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(LayerDescriptor::Output(BindingDescriptor { id: binding }), name)
    }

    pub fn add_pooling2d_layer(
        &mut self,
        descriptor: Pooling2dDescriptor,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(descriptor, name)
    }

    pub fn add_convolution2d_layer(
        &mut self,
        descriptor: Convolution2dDescriptor,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(descriptor, name)
    }

    pub fn add_activation_layer(
        &mut self,
        descriptor: ActivationDescriptor,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(descriptor, name)
    }

    pub fn add_l2_normalization_layer(
        &mut self,
        descriptor: L2NormalizationDescriptor,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(descriptor, name)
    }

    pub fn add_elementwise_unary_layer(
        &mut self,
        descriptor: ElementwiseUnaryDescriptor,
        name: impl Into<String>,
    ) -> Result<LayerId, ValidationError> {
        self.add_layer(descriptor, name)
    }

    fn output_slot(&self, slot: OutputSlotId) -> Result<&OutputSlot, ValidationError> {
        self.layer(slot.layer)?
            .outputs
            .get(slot.index)
            .ok_or(ValidationError::NoSuchOutputSlot(slot))
    }

    fn output_slot_mut(&mut self, slot: OutputSlotId) -> Result<&mut OutputSlot, ValidationError> {
        self.layer_mut(slot.layer)?
            .outputs
            .get_mut(slot.index)
            .ok_or(ValidationError::NoSuchOutputSlot(slot))
    }

    pub fn tensor_info(&self, slot: OutputSlotId) -> Option<&TensorInfo> {
        self.output_slot(slot).ok()?.info.as_ref()
    }

    /// Source of `input`, if connected.
    pub fn source_of(&self, input: InputSlotId) -> Result<Option<OutputSlotId>, ValidationError> {
        self.layer(input.layer)?
            .inputs
            .get(input.index)
            .copied()
            .ok_or(ValidationError::NoSuchInputSlot(input))
    }

    /// Assigns or replaces the descriptor of an output slot. Existing consumers must still accept it.
    pub fn set_tensor_info(
        &mut self,
        slot: OutputSlotId,
        info: TensorInfo,
    ) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        for consumer in self.output_slot(slot)?.consumers.iter() {
            self.check_input(*consumer, &info)?;
        }
        self.output_slot_mut(slot)?.info = Some(info);
        Ok(())
    }

    fn check_input(&self, input: InputSlotId, info: &TensorInfo) -> Result<(), ValidationError> {
        self.layer(input.layer)?
            .descriptor
            .validate_input(input.index, info)
            .map_err(|reason| ValidationError::IncompatibleTensorInfo { input, reason })
    }

    /// Wires `producer` into `consumer`.
    ///
    /// Fails when the producer has no tensor info, the consumer slot is taken, the consumer
    /// rejects the descriptor, or the edge would close a cycle.
    pub fn connect(
        &mut self,
        producer: OutputSlotId,
        consumer: InputSlotId,
    ) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let info = self
            .output_slot(producer)?
            .info
            .as_ref()
            .ok_or(ValidationError::TensorInfoNotSet(producer))?;
        if let Some(existing) = self.source_of(consumer)? {
            return Err(ValidationError::AlreadyConnected {
                input: consumer,
                producer: existing,
            });
        }
        self.check_input(consumer, info)?;
        if self.reaches(consumer.layer, producer.layer) {
            return Err(ValidationError::Cycle {
                producer: producer.layer,
                consumer: consumer.layer,
            });
        }

        self.layer_mut(consumer.layer)?.inputs[consumer.index] = Some(producer);
        self.output_slot_mut(producer)?.consumers.push(consumer);
        tracing::trace!(%producer, %consumer, "connected");
        Ok(())
    }

    /// Returns `true` when `target` is `from` or downstream of it.
    fn reaches(&self, from: LayerId, target: LayerId) -> bool {
        let mut visited = vec![false; self.layers.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            let Some(layer) = self.layers.get(id.0) else {
                continue;
            };
            if std::mem::replace(&mut visited[id.0], true) {
                continue;
            }
            for slot in &layer.outputs {
                stack.extend(slot.consumers.iter().map(|input| input.layer));
            }
        }
        false
    }

    /// Detaches `consumer` from its producer and returns the producer slot.
    pub fn disconnect(&mut self, consumer: InputSlotId) -> Result<OutputSlotId, ValidationError> {
        self.ensure_mutable()?;
        let producer = self
            .source_of(consumer)?
            .ok_or(ValidationError::Unconnected(consumer))?;
        self.layer_mut(consumer.layer)?.inputs[consumer.index] = None;
        self.output_slot_mut(producer)?
            .consumers
            .retain(|input| *input != consumer);
        Ok(producer)
    }

    /// Re-points every consumer of `from` at `to`. Used to splice a layer onto an existing edge.
    pub fn move_connections(
        &mut self,
        from: OutputSlotId,
        to: OutputSlotId,
    ) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let info = self
            .output_slot(to)?
            .info
            .clone()
            .ok_or(ValidationError::TensorInfoNotSet(to))?;
        let consumers = self.output_slot(from)?.consumers.clone();
        for consumer in &consumers {
            self.check_input(*consumer, &info)?;
            if self.reaches(consumer.layer, to.layer) {
                return Err(ValidationError::Cycle {
                    producer: to.layer,
                    consumer: consumer.layer,
                });
            }
        }

        self.output_slot_mut(from)?.consumers.clear();
        for consumer in &consumers {
            self.layer_mut(consumer.layer)?.inputs[consumer.index] = Some(to);
        }
        self.output_slot_mut(to)?.consumers.extend(consumers);
        Ok(())
    }

    /// Moves `layer` from Unbound to Bound.
    pub fn bind(&mut self, layer: LayerId, backend: BackendId) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let entry = self.layer_mut(layer)?;
        if let LayerBinding::Bound(existing) = &entry.binding {
            return Err(ValidationError::AlreadyBound {
                layer,
                backend: existing.clone(),
            });
        }
        tracing::trace!(%layer, %backend, "bound layer");
        entry.binding = LayerBinding::Bound(backend);
        Ok(())
    }

    /// Records an activation the bound backend will apply inside the layer's own workload.
    pub fn set_fused_activation(
        &mut self,
        layer: LayerId,
        activation: ActivationDescriptor,
    ) -> Result<(), ValidationError> {
        self.ensure_mutable()?;
        let entry = self.layer_mut(layer)?;
        if !entry.descriptor.can_fuse_activation() {
            return Err(ValidationError::invalid_descriptor(
                entry.descriptor.kind(),
                "operation cannot carry a fused activation",
            ));
        }
        entry.fused_activation = Some(activation);
        Ok(())
    }

    fn bindings(&self, kind: OperationKind) -> Vec<(BindingId, LayerId)> {
        self.layers
            .iter()
            .filter(|layer| layer.descriptor.kind() == kind)
            .filter_map(|layer| layer.descriptor.binding_id().map(|id| (id, layer.id)))
            .collect()
    }

    pub fn input_layers(&self) -> Vec<(BindingId, LayerId)> {
        self.bindings(OperationKind::Input)
    }

    pub fn output_layers(&self) -> Vec<(BindingId, LayerId)> {
        self.bindings(OperationKind::Output)
    }

    /// Layers in dependency order; ties are broken by ascending id so the order is stable.
    pub fn topological_order(&self) -> Result<Vec<LayerId>, ValidationError> {
        let mut pending: Vec<usize> = self
            .layers
            .iter()
            .map(|layer| layer.inputs.iter().flatten().count())
            .collect();
        let mut ready: BinaryHeap<Reverse<LayerId>> = self
            .layers
            .iter()
            .filter(|layer| pending[layer.id.0] == 0)
            .map(|layer| Reverse(layer.id))
            .collect();

        let mut order = Vec::with_capacity(self.layers.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for slot in &self.layers[id.0].outputs {
                for consumer in &slot.consumers {
                    let count = &mut pending[consumer.layer.0];
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(consumer.layer));
                    }
                }
            }
        }

        if order.len() != self.layers.len() {
            let stuck = self
                .layers
                .iter()
                .find(|layer| pending[layer.id.0] > 0)
                .map(|layer| layer.id)
                .unwrap_or(LayerId(0));
            return Err(ValidationError::Cycle {
                producer: stuck,
                consumer: stuck,
            });
        }
        Ok(order)
    }

    /// Checks the whole graph is executable: every input connected, every output described, and
    /// every described output consistent with what its layer computes from its inputs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for layer in &self.layers {
            for (index, source) in layer.inputs.iter().enumerate() {
                if source.is_none() {
                    return Err(ValidationError::Unconnected(layer.id.input(index)));
                }
            }
            for (index, slot) in layer.outputs.iter().enumerate() {
                if slot.info.is_none() {
                    return Err(ValidationError::TensorInfoNotSet(layer.id.output(index)));
                }
            }
        }
        self.topological_order()?;
        for layer in &self.layers {
            self.check_layer_outputs(layer)?;
        }
        Ok(())
    }

    fn check_layer_outputs(&self, layer: &Layer) -> Result<(), ValidationError> {
        let inputs = layer
            .inputs
            .iter()
            .flatten()
            .map(|source| {
                self.tensor_info(*source)
                    .cloned()
                    .ok_or(ValidationError::TensorInfoNotSet(*source))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = layer
            .output_infos()
            .ok_or(ValidationError::TensorInfoNotSet(layer.id.output(0)))?;
        layer
            .descriptor
            .check_output_infos(&inputs, &outputs)
            .map_err(|err| {
                tracing::debug!(layer = %layer.id, name = %layer.name, %err, "inconsistent outputs");
                err
            })
    }

    /// Validates and freezes the graph. Idempotent.
    pub fn finalize(&mut self) -> Result<(), ValidationError> {
        if self.finalized {
            return Ok(());
        }
        self.validate()?;
        self.finalized = true;
        tracing::debug!(layers = self.layers.len(), "network finalized");
        Ok(())
    }

    /// Runs `f` against the network and restores the previous state if it fails.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Network) -> Result<T, E>,
    ) -> Result<T, E> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                tracing::trace!(layers = self.layers.len(), "rolled back network change");
                Err(err)
            }
        }
    }
}
