use ndarray::{Array2, Zip};

use super::{Optimizer, optimizer::check_shape};
use crate::Result;

/// Adam: moving averages of the gradient and its square, with a bias-corrected step size.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    steps: i32,
    m: Array2<f32>,
    v: Array2<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `shape` - The shape of the parameter this instance updates.
    /// * `learning_rate` - The scale of every step.
    /// * `beta1`, `beta2` - The decays of the first and second moment estimates.
    /// * `epsilon` - Added to the root of the second moment.
    pub fn new(
        shape: (usize, usize),
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            steps: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, grad: &Array2<f32>, param: &mut Array2<f32>) -> Result<()> {
        check_shape(grad, param.dim())?;
        check_shape(grad, self.m.dim())?;

        self.steps += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let step_size =
            self.learning_rate * (1. - b2.powi(self.steps)).sqrt() / (1. - b1.powi(self.steps));

        Zip::from(param)
            .and(grad)
            .and(&mut self.m)
            .and(&mut self.v)
            .par_for_each(|p, &g, m, v| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g * g;
                *p -= step_size * *m / (v.sqrt() + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::MlErr;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::new((1, 3), 0.01, 0.9, 0.999, 1e-7);
        let mut param = array![[1., 1., 1.]];

        adam.update(&array![[0.5, -3., 0.]], &mut param).unwrap();

        // After bias correction the first step is lr * sign(g).
        assert!((param[[0, 0]] - 0.99).abs() < 1e-5);
        assert!((param[[0, 1]] - 1.01).abs() < 1e-5);
        assert_eq!(param[[0, 2]], 1.);
    }

    #[test]
    fn converges_on_a_quadratic() {
        let mut adam = Adam::new((1, 1), 0.1, 0.9, 0.999, 1e-7);
        let mut param = array![[3.]];

        for _ in 0..500 {
            let grad = param.mapv(|p| 2. * p);
            adam.update(&grad, &mut param).unwrap();
        }

        assert!(param[[0, 0]].abs() < 0.1);
    }

    #[test]
    fn state_shape_is_checked() {
        let mut adam = Adam::new((1, 2), 0.01, 0.9, 0.999, 1e-7);
        assert!(matches!(
            adam.update(&array![[1., 2., 3.]], &mut array![[0., 0., 0.]]),
            Err(MlErr::ShapeMismatch { .. })
        ));
    }
}
