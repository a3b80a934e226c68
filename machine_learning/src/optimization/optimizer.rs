use ndarray::Array2;

use crate::{MlErr, Result};

/// Defines the strategy for updating a parameter matrix based on its gradient.
pub trait Optimizer {
    /// Updates `param` in place using the given gradient.
    ///
    /// # Returns
    /// An error if `grad` does not have the shape of `param`, or of the state this optimizer
    /// was built for.
    fn update(&mut self, grad: &Array2<f32>, param: &mut Array2<f32>) -> Result<()>;
}

pub(super) fn check_shape(grad: &Array2<f32>, expected: (usize, usize)) -> Result<()> {
    if grad.dim() != expected {
        return Err(MlErr::ShapeMismatch {
            what: "optimizer gradient".into(),
            got: grad.dim(),
            expected,
        });
    }

    Ok(())
}
