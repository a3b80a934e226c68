mod adam;
mod gradient_descent;
mod optimizer;

use serde::{Deserialize, Serialize};

pub use adam::Adam;
pub use gradient_descent::{GradientDescent, GradientDescentWithMomentum};
pub use optimizer::Optimizer;

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

impl OptimizerSpec {
    /// Adam with the usual moment decays.
    pub fn adam(learning_rate: f32) -> Self {
        Self::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Adam { learning_rate, .. }
            | Self::GradientDescent { learning_rate }
            | Self::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }

    /// Builds an optimizer holding state for a parameter of the given shape.
    pub fn build(&self, shape: (usize, usize)) -> Box<dyn Optimizer + Send> {
        match *self {
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(shape, learning_rate, beta1, beta2, epsilon)),
            Self::GradientDescent { learning_rate } => Box::new(GradientDescent::new(learning_rate)),
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(
                shape,
                learning_rate,
                momentum,
            )),
        }
    }
}
