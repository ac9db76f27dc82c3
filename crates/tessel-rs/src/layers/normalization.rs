use serde::{Deserialize, Serialize};

use crate::tensor::DataLayout;

/// Normalizes every position by the L2 norm across the channel axis:
/// `x / sqrt(max(sum(x^2), eps))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct L2NormalizationDescriptor {
    pub eps: f32,
    pub data_layout: DataLayout,
}

impl Default for L2NormalizationDescriptor {
    fn default() -> Self {
        Self {
            eps: 1e-12,
            data_layout: DataLayout::default(),
        }
    }
}

impl L2NormalizationDescriptor {
    pub fn validate(&self) -> Result<(), String> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(format!("eps must be finite and positive, got {}", self.eps));
        }
        Ok(())
    }
}
