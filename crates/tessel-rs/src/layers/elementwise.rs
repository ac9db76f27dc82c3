use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperation {
    Abs,
    Exp,
    Log,
    Neg,
    Rsqrt,
    Sqrt,
}

impl UnaryOperation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOperation::Abs => x.abs(),
            UnaryOperation::Exp => x.exp(),
            UnaryOperation::Log => x.ln(),
            UnaryOperation::Neg => -x,
            UnaryOperation::Rsqrt => 1.0 / x.sqrt(),
            UnaryOperation::Sqrt => x.sqrt(),
        }
    }
}

impl fmt::Display for UnaryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaryOperation::Abs => "Abs",
            UnaryOperation::Exp => "Exp",
            UnaryOperation::Log => "Log",
            UnaryOperation::Neg => "Neg",
            UnaryOperation::Rsqrt => "Rsqrt",
            UnaryOperation::Sqrt => "Sqrt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementwiseUnaryDescriptor {
    pub operation: UnaryOperation,
}

impl ElementwiseUnaryDescriptor {
    pub fn new(operation: UnaryOperation) -> Self {
        Self { operation }
    }
}
