use log::debug;
use machine_learning::params::Weights;
use rayon::prelude::*;

use super::{AdapterResult, InnerLearningRate, TaskAdapter};
use crate::{MamlErr, Result, metrics::StepMetrics, task::Task};

/// The adapter results of a whole batch, in task order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub tasks: Vec<AdapterResult>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The batch mean of the pre-update support metrics.
    pub fn mean_pre(&self) -> StepMetrics {
        StepMetrics::mean(self.tasks.iter().map(|r| r.pre))
    }

    /// The batch mean of the post-update query metrics, one entry per inner step.
    pub fn mean_post(&self) -> Vec<StepMetrics> {
        let steps = self.tasks.first().map_or(0, |r| r.post.len());

        (0..steps)
            .map(|step| StepMetrics::mean(self.tasks.iter().map(|r| r.post[step])))
            .collect()
    }
}

/// Adapts to every task of `batch` independently, in parallel.
///
/// The first task is adapted once on its own beforehand and that result is thrown away, so any
/// state the model builds lazily exists before the parallel pass.
///
/// # Returns
/// One result per task in the order of `batch`, or the first error any task produced.
pub fn run_batch(
    adapter: &TaskAdapter<'_>,
    batch: &[Task],
    weights: &Weights,
    lr: &InnerLearningRate,
) -> Result<BatchResult> {
    let first = batch.first().ok_or(MamlErr::EmptyBatch)?;
    adapter.adapt(first, weights, lr)?;

    debug!(tasks = batch.len(); "adapting task batch");

    let tasks = batch
        .par_iter()
        .map(|task| adapter.adapt(task, weights, lr))
        .collect::<Result<Vec<_>>>()?;

    Ok(BatchResult { tasks })
}
