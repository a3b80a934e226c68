//! Model-agnostic meta-learning for few-shot multi-label land-cover classification.
//!
//! A [`maml::Maml`] learner adapts a shared initialization to each sampled task with a few
//! gradient steps on its support set, then updates that initialization with the gradient of
//! the query loss taken through those steps.

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod labels;
pub mod maml;
pub mod metrics;
pub mod scalars;
pub mod task;

mod error;

pub use config::MamlConfig;
pub use error::{MamlErr, Result};
