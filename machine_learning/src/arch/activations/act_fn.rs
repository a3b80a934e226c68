use serde::{Deserialize, Serialize};

use crate::autodiff::Var;

/// An element-wise activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFn {
    Relu,
    Sigmoid,
}
use ActFn::*;

impl ActFn {
    pub fn apply(&self, x: &Var) -> Var {
        match self {
            Relu => x.relu(),
            Sigmoid => x.sigmoid(),
        }
    }
}
