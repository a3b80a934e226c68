//! Reverse-mode automatic differentiation over dense row-major matrices.
//!
//! Every node is an immutable, reference counted [`Var`]. Backward rules are written with the
//! same operations used in the forward pass, so the gradients returned by [`grad`] in
//! [`GradMode::Graph`] are themselves part of a graph and can be differentiated again. That
//! is what lets an outer optimization step see through inner gradient descent steps.

mod backward;
mod gather;
mod var;

pub use backward::{GradMode, grad};
pub use gather::GatherIndex;
pub use var::Var;
