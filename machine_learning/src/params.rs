use std::collections::BTreeMap;

use ndarray::Array2;

use crate::{MlErr, Result, autodiff::Var};

/// A functional snapshot of a model's weights, keyed by parameter name.
pub type Weights = BTreeMap<String, Var>;

/// Looks up `name` in `weights`.
///
/// # Returns
/// The weight or `MlErr::MissingParam` if there is none with that name.
pub fn weight<'w>(weights: &'w Weights, name: &str) -> Result<&'w Var> {
    weights.get(name).ok_or_else(|| MlErr::MissingParam {
        name: name.to_string(),
    })
}

/// The persistent, named parameters of a model. Keys are ordered, so iterating a store is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamStore {
    params: BTreeMap<String, Array2<f32>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Array2<f32>) {
        self.params.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f32>> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Array2<f32>> {
        self.params.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Replaces the value of an existing parameter, keeping its shape.
    ///
    /// # Returns
    /// An error if there is no such parameter or the shapes differ.
    pub fn assign(&mut self, name: &str, value: Array2<f32>) -> Result<()> {
        let slot = self
            .params
            .get_mut(name)
            .ok_or_else(|| MlErr::MissingParam {
                name: name.to_string(),
            })?;

        if slot.dim() != value.dim() {
            return Err(MlErr::ShapeMismatch {
                what: format!("parameter '{name}'"),
                got: value.dim(),
                expected: slot.dim(),
            });
        }

        *slot = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The total amount of scalars across all parameters.
    pub fn num_scalars(&self) -> usize {
        self.params.values().map(Array2::len).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.params.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Array2<f32>)> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Array2<f32>)> {
        self.params.iter_mut()
    }

    /// Lifts every parameter into a graph leaf.
    ///
    /// # Arguments
    /// * `requires_grad` - Whether the leaves should be differentiable.
    pub fn leaves(&self, requires_grad: bool) -> Weights {
        self.params
            .iter()
            .map(|(name, value)| {
                let leaf = if requires_grad {
                    Var::parameter(value.clone())
                } else {
                    Var::constant(value.clone())
                };

                (name.clone(), leaf)
            })
            .collect()
    }
}
