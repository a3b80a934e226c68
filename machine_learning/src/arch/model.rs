use std::{cell::RefCell, rc::Rc};

use rand::rngs::StdRng;

use crate::{
    Result,
    autodiff::Var,
    params::{ParamStore, Weights},
};

/// A model is a pure function of its inputs and a set of named weights.
///
/// It never owns the weights it is evaluated with, so the same model can be run with the shared
/// weights and with any adapted copy of them, concurrently.
pub trait Model: Send + Sync {
    /// The name the model is registered under.
    fn name(&self) -> &'static str;

    /// The amount of features of each input row.
    fn dim_input(&self) -> usize;

    /// The amount of logits of each output row.
    fn dim_output(&self) -> usize;

    /// Creates the initial values of every weight this model reads.
    ///
    /// # Arguments
    /// * `rng` - The random number generator to sample from.
    ///
    /// # Returns
    /// The initial weights or an error if a distribution could not be built.
    fn init_params(&self, rng: Rc<RefCell<StdRng>>) -> Result<ParamStore>;

    /// Computes the logits of `x`.
    ///
    /// # Arguments
    /// * `x` - A `(n, dim_input)` batch.
    /// * `weights` - The weights to evaluate the model with.
    ///
    /// # Returns
    /// The `(n, dim_output)` logits or an error if a weight is missing or a shape is off.
    fn forward(&self, x: &Var, weights: &Weights) -> Result<Var>;
}
