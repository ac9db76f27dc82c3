use std::fmt;

use serde::{Deserialize, Serialize};

/// Activation functions understood by the engine. `a` and `b` on the descriptor parameterize the
/// functions that need them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    /// `a * tanh(b * x)`
    TanH,
    /// `a * x + b`
    Linear,
    ReLu,
    /// `min(a, max(b, x))`
    BoundedReLu,
    /// `x` when positive, `a * x` otherwise.
    LeakyReLu,
    Abs,
    Sqrt,
    Square,
    /// `x` when non-negative, `a * (exp(x) - 1)` otherwise.
    Elu,
    HardSwish,
}

impl ActivationFunction {
    pub fn name(self) -> &'static str {
        match self {
            ActivationFunction::Sigmoid => "Sigmoid",
            ActivationFunction::TanH => "TanH",
            ActivationFunction::Linear => "Linear",
            ActivationFunction::ReLu => "ReLu",
            ActivationFunction::BoundedReLu => "BoundedReLu",
            ActivationFunction::LeakyReLu => "LeakyReLu",
            ActivationFunction::Abs => "Abs",
            ActivationFunction::Sqrt => "Sqrt",
            ActivationFunction::Square => "Square",
            ActivationFunction::Elu => "Elu",
            ActivationFunction::HardSwish => "HardSwish",
        }
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationDescriptor {
    pub function: ActivationFunction,
    pub a: f32,
    pub b: f32,
}

impl ActivationDescriptor {
    pub fn new(function: ActivationFunction) -> Self {
        Self {
            function,
            a: 0.0,
            b: 0.0,
        }
    }

    pub fn with_params(function: ActivationFunction, a: f32, b: f32) -> Self {
        Self { function, a, b }
    }

    pub fn relu() -> Self {
        Self::new(ActivationFunction::ReLu)
    }

    /// Clamps into `[lower, upper]`.
    pub fn bounded_relu(upper: f32, lower: f32) -> Self {
        Self::with_params(ActivationFunction::BoundedReLu, upper, lower)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.a.is_finite() || !self.b.is_finite() {
            return Err(format!(
                "{} parameters must be finite (a={}, b={})",
                self.function, self.a, self.b
            ));
        }
        if self.function == ActivationFunction::BoundedReLu && self.a < self.b {
            return Err(format!(
                "BoundedReLu upper bound {} is below lower bound {}",
                self.a, self.b
            ));
        }
        Ok(())
    }

    /// Evaluates the activation on one value.
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        let (a, b) = (self.a, self.b);
        match self.function {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::TanH => a * (b * x).tanh(),
            ActivationFunction::Linear => a * x + b,
            ActivationFunction::ReLu => x.max(0.0),
            ActivationFunction::BoundedReLu => x.max(b).min(a),
            ActivationFunction::LeakyReLu => {
                if x > 0.0 {
                    x
                } else {
                    a * x
                }
            }
            ActivationFunction::Abs => x.abs(),
            ActivationFunction::Sqrt => x.sqrt(),
            ActivationFunction::Square => x * x,
            ActivationFunction::Elu => {
                if x >= 0.0 {
                    x
                } else {
                    a * (x.exp() - 1.0)
                }
            }
            ActivationFunction::HardSwish => x * (x + 3.0).clamp(0.0, 6.0) / 6.0,
        }
    }

    pub fn apply_in_place(&self, values: &mut [f32]) {
        for value in values {
            *value = self.apply(*value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_relu_clamps_both_sides() {
        let act = ActivationDescriptor::bounded_relu(6.0, 0.0);
        assert_eq!(act.apply(-1.0), 0.0);
        assert_eq!(act.apply(3.5), 3.5);
        assert_eq!(act.apply(9.0), 6.0);
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        assert!(ActivationDescriptor::bounded_relu(-1.0, 1.0).validate().is_err());
    }

    #[test]
    fn hard_swish_matches_reference_points() {
        let act = ActivationDescriptor::new(ActivationFunction::HardSwish);
        assert_eq!(act.apply(-4.0), 0.0);
        assert_eq!(act.apply(4.0), 4.0);
        assert!((act.apply(1.0) - 4.0 / 6.0).abs() < 1e-6);
    }
}
