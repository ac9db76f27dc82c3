use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable index of a layer inside its [`Network`](super::Network) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub usize);

impl LayerId {
    pub fn output(self, index: usize) -> OutputSlotId {
        OutputSlotId { layer: self, index }
    }

    pub fn input(self, index: usize) -> InputSlotId {
        InputSlotId { layer: self, index }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputSlotId {
    pub layer: LayerId,
    pub index: usize,
}

impl fmt::Display for OutputSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:out{}", self.layer, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputSlotId {
    pub layer: LayerId,
    pub index: usize,
}

impl fmt::Display for InputSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:in{}", self.layer, self.index)
    }
}

/// Caller-chosen id naming a network input or output at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingId(pub u32);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}
