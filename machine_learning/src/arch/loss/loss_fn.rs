use crate::{MlErr, Result, autodiff::Var};

/// A differentiable loss over a batch of logits.
pub trait LossFn: Send + Sync {
    /// Computes the loss of `logits` against `targets`.
    ///
    /// # Arguments
    /// * `logits` - The `(n, c)` raw model outputs.
    /// * `targets` - The `(n, c)` encoded labels.
    ///
    /// # Returns
    /// A `(1, 1)` node or an error if the shapes differ.
    fn loss(&self, logits: &Var, targets: &Var) -> Result<Var>;
}

pub(super) fn check_targets(logits: &Var, targets: &Var) -> Result<()> {
    if logits.shape() != targets.shape() {
        return Err(MlErr::ShapeMismatch {
            what: "loss targets".into(),
            got: targets.shape(),
            expected: logits.shape(),
        });
    }

    Ok(())
}
