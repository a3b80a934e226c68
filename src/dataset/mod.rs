//! Sampling of few-shot multi-label tasks.

mod synthetic;

use std::{fmt, str::FromStr};

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::{MamlErr, Result};

pub use synthetic::{BIGEARTHNET_CLASSES, SyntheticConfig, SyntheticPatches};

/// The disjoint class splits tasks are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
}

/// How the label sets of a task's examples are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Every class of the task shows up in both the support and the query half.
    #[default]
    Greedy,
    /// Every example gets a uniformly drawn non-empty subset of the task's classes.
    Uniform,
}

impl FromStr for SamplingMode {
    type Err = MamlErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy" => Ok(Self::Greedy),
            "uniform" => Ok(Self::Uniform),
            _ => Err(MamlErr::InvalidConfig(format!(
                "unknown sampling mode '{s}', expected 'greedy' or 'uniform'"
            ))),
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Greedy => f.write_str("greedy"),
            Self::Uniform => f.write_str("uniform"),
        }
    }
}

/// A batch of sampled tasks.
#[derive(Debug, Clone)]
pub struct SampledBatch {
    /// `(tasks, examples, features)` images, flattened in `HWC` order.
    pub inputs: Array3<f32>,
    /// `(tasks, examples, k)` multi-hot labels, label `i` being the task's `i`-th class.
    pub labels: Array3<f32>,
    /// The class names behind the label columns of each task.
    pub debug_labels: Vec<Vec<String>>,
}

/// A source of few-shot tasks.
pub trait TaskSampler {
    /// The amount of classes of every task.
    fn label_subset_size(&self) -> usize;

    /// The amount of examples of every task, support and query sets together.
    fn examples_per_task(&self) -> usize;

    /// Samples `batch_size` tasks out of `split`.
    fn sample_batch(
        &mut self,
        batch_size: usize,
        split: Split,
        mode: SamplingMode,
    ) -> Result<SampledBatch>;

    /// Restarts the sampling stream from `seed`.
    fn reseed(&mut self, seed: u64);
}
