//! Layer graph: an arena of layers connected through output and input slots.

mod ids;
mod layer;
mod network;

pub use ids::{BindingId, InputSlotId, LayerId, OutputSlotId};
pub use layer::{Layer, LayerBinding, OutputSlot};
pub use network::Network;
