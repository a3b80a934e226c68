use ndarray::{Array2, Zip};

use super::{Optimizer, optimizer::check_shape};
use crate::Result;

/// Plain gradient descent.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update(&mut self, grad: &Array2<f32>, param: &mut Array2<f32>) -> Result<()> {
        check_shape(grad, param.dim())?;
        param.scaled_add(-self.learning_rate, grad);
        Ok(())
    }
}

/// Gradient descent along an exponentially decaying sum of past gradients.
#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Array2<f32>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `shape` - The shape of the parameter this instance updates.
    /// * `learning_rate` - The scale of every step.
    /// * `momentum` - The decay of the accumulated velocity.
    pub fn new(shape: (usize, usize), learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Array2::zeros(shape),
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update(&mut self, grad: &Array2<f32>, param: &mut Array2<f32>) -> Result<()> {
        check_shape(grad, param.dim())?;
        check_shape(grad, self.velocity.dim())?;

        let (lr, mu) = (self.learning_rate, self.momentum);

        Zip::from(param)
            .and(grad)
            .and(&mut self.velocity)
            .for_each(|p, &g, v| {
                *v = mu * *v + g;
                *p -= lr * *v;
            });

        Ok(())
    }
}
