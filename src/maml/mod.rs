//! Model-agnostic meta-learning.
//!
//! [`TaskAdapter`] runs the inner loop on one task, [`run_batch`] runs it over a batch of
//! tasks and [`Maml`] differentiates the batch's query loss through the inner loop to update
//! the shared weights.

mod adapter;
mod learner;
mod params;
mod runner;

pub use adapter::{AdapterResult, TaskAdapter};
pub use learner::{Maml, MetaStep};
pub use params::{InnerLearningRate, MetaParams, inner_lr_key};
pub use runner::{BatchResult, run_batch};
