use smallvec::SmallVec;

use super::{InputSlotId, LayerId, OutputSlotId};
use crate::backend::BackendId;
use crate::layers::{ActivationDescriptor, LayerDescriptor};
use crate::tensor::TensorInfo;

/// Backend assignment of a layer. Once bound, a layer cannot return to `Unbound`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayerBinding {
    #[default]
    Unbound,
    Bound(BackendId),
}

impl LayerBinding {
    pub fn backend(&self) -> Option<&BackendId> {
        match self {
            LayerBinding::Unbound => None,
            LayerBinding::Bound(id) => Some(id),
        }
    }
}

/// Producer side of an edge: a tensor descriptor plus the input slots it feeds.
#[derive(Debug, Clone, Default)]
pub struct OutputSlot {
    pub(crate) info: Option<TensorInfo>,
    pub(crate) consumers: SmallVec<[InputSlotId; 4]>,
}

impl OutputSlot {
    pub fn info(&self) -> Option<&TensorInfo> {
        self.info.as_ref()
    }

    pub fn consumers(&self) -> &[InputSlotId] {
        &self.consumers
    }

    pub fn is_connected(&self) -> bool {
        !self.consumers.is_empty()
    }
}

/// Arena record for one operation instance.
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) descriptor: LayerDescriptor,
    pub(crate) inputs: Vec<Option<OutputSlotId>>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) binding: LayerBinding,
    pub(crate) fused_activation: Option<ActivationDescriptor>,
}

impl Layer {
    pub(crate) fn new(id: LayerId, name: String, descriptor: LayerDescriptor) -> Self {
        let inputs = vec![None; descriptor.num_inputs()];
        let outputs = vec![OutputSlot::default(); descriptor.num_outputs()];
        Self {
            id,
            name,
            descriptor,
            inputs,
            outputs,
            binding: LayerBinding::Unbound,
            fused_activation: None,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    /// Source of every input slot, `None` while unconnected.
    pub fn inputs(&self) -> &[Option<OutputSlotId>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&OutputSlot> {
        self.outputs.get(index)
    }

    pub fn binding(&self) -> &LayerBinding {
        &self.binding
    }

    pub fn backend(&self) -> Option<&BackendId> {
        self.binding.backend()
    }

    pub fn fused_activation(&self) -> Option<&ActivationDescriptor> {
        self.fused_activation.as_ref()
    }

    /// Output descriptors in slot order; `None` if any slot is still unset.
    pub fn output_infos(&self) -> Option<Vec<TensorInfo>> {
        self.outputs.iter().map(|slot| slot.info.clone()).collect()
    }
}
