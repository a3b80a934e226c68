use machine_learning::{
    MlErr,
    autodiff::Var,
    params::{ParamStore, Weights, weight},
};
use ndarray::Array2;

use crate::Result;

/// The name of the learned inner learning rate of `key` at inner step `step`.
pub fn inner_lr_key(key: &str, step: usize) -> String {
    format!("inner_update_lr/{key}/{step}")
}

/// The step size of the inner gradient descent.
#[derive(Debug, Clone)]
pub enum InnerLearningRate {
    /// One rate for every weight and step.
    Fixed(f32),
    /// A `(1, 1)` rate per weight and step, keyed by [`inner_lr_key`].
    Learned(Weights),
}

impl InnerLearningRate {
    /// `w - lr(key, step) * g`.
    ///
    /// # Returns
    /// The updated weight or an error if a learned rate is missing.
    pub fn apply(&self, key: &str, step: usize, w: &Var, g: &Var) -> Result<Var> {
        match self {
            Self::Fixed(lr) => Ok(w.sub(&g.scale(*lr))),
            Self::Learned(rates) => {
                let lr = weight(rates, &inner_lr_key(key, step))?;
                Ok(w.sub(&lr.fill(g.shape()).mul(g)))
            }
        }
    }

    /// The graph leaves of the learned rates, none for a fixed rate.
    pub fn leaves(&self) -> Vec<(&String, &Var)> {
        match self {
            Self::Fixed(_) => Vec::new(),
            Self::Learned(rates) => rates.iter().collect(),
        }
    }
}

/// Everything the outer loop optimizes: the shared weights and, when they are learned, the
/// inner learning rates.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaParams {
    weights: ParamStore,
    inner_lrs: Option<ParamStore>,
    inner_update_lr: f32,
}

impl MetaParams {
    /// Creates a new `MetaParams`.
    ///
    /// # Arguments
    /// * `weights` - The initial shared weights.
    /// * `inner_update_lr` - The inner learning rate, or the initial value of every learned one.
    /// * `learn_inner_update_lr` - Whether to learn one rate per weight and inner step.
    /// * `num_inner_updates` - The amount of inner steps.
    pub fn new(
        weights: ParamStore,
        inner_update_lr: f32,
        learn_inner_update_lr: bool,
        num_inner_updates: usize,
    ) -> Self {
        let inner_lrs = learn_inner_update_lr.then(|| {
            let mut rates = ParamStore::new();

            for key in weights.keys() {
                for step in 0..num_inner_updates {
                    rates.insert(
                        inner_lr_key(key, step),
                        Array2::from_elem((1, 1), inner_update_lr),
                    );
                }
            }

            rates
        });

        Self {
            weights,
            inner_lrs,
            inner_update_lr,
        }
    }

    pub fn weights(&self) -> &ParamStore {
        &self.weights
    }

    pub fn inner_lrs(&self) -> Option<&ParamStore> {
        self.inner_lrs.as_ref()
    }

    pub fn learns_inner_lr(&self) -> bool {
        self.inner_lrs.is_some()
    }

    /// The current value of the weight or learned rate called `name`.
    pub fn get(&self, name: &str) -> Result<&Array2<f32>> {
        self.weights
            .get(name)
            .or_else(|| self.inner_lrs.as_ref().and_then(|rates| rates.get(name)))
            .ok_or_else(|| {
                MlErr::MissingParam {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// The store holding `name`, weights first.
    pub fn store_of_mut(&mut self, name: &str) -> Result<&mut ParamStore> {
        if self.weights.contains(name) {
            return Ok(&mut self.weights);
        }

        match self.inner_lrs.as_mut() {
            Some(rates) if rates.contains(name) => Ok(rates),
            _ => Err(MlErr::MissingParam {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// The amount of trainable scalars.
    pub fn num_scalars(&self) -> usize {
        self.weights.num_scalars() + self.inner_lrs.as_ref().map_or(0, ParamStore::num_scalars)
    }

    /// Lifts the parameters into differentiable graph leaves.
    pub fn leaves(&self) -> (Weights, InnerLearningRate) {
        let lr = match &self.inner_lrs {
            Some(rates) => InnerLearningRate::Learned(rates.leaves(true)),
            None => InnerLearningRate::Fixed(self.inner_update_lr),
        };

        (self.weights.leaves(true), lr)
    }
}
