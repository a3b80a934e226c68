//! The meta-training and meta-testing loops.

mod meta_test;
mod meta_train;

use log::debug;

pub use meta_test::{MetaTestReport, meta_test};
pub use meta_train::{TrainSummary, meta_train};

use crate::{
    Result,
    dataset::{SamplingMode, Split, TaskSampler},
    labels::LabelCodec,
    task::{Task, support_query_split},
};

/// Samples `batch_size` tasks out of `split` and encodes them for the model.
pub fn sample_tasks<S: TaskSampler + ?Sized>(
    sampler: &mut S,
    batch_size: usize,
    split: Split,
    mode: SamplingMode,
    codec: &LabelCodec,
) -> Result<Vec<Task>> {
    let batch = sampler.sample_batch(batch_size, split, mode)?;
    debug!(split:? = split, classes:? = batch.debug_labels; "sampled tasks");

    support_query_split(&batch.inputs, &batch.labels, codec)
}
