use std::{path::PathBuf, time::Instant};

use log::info;

use super::sample_tasks;
use crate::{
    Result, checkpoint,
    config::MamlConfig,
    dataset::{Split, TaskSampler},
    maml::{Maml, MetaStep},
    metrics::StepMetrics,
    scalars::ScalarWriter,
};

/// How a training run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub last_itr: usize,
    pub checkpoint: PathBuf,
}

/// Pre and post-update metrics collected since the last summary.
#[derive(Debug, Default)]
struct RunningMetrics {
    pre: Vec<StepMetrics>,
    post: Vec<StepMetrics>,
}

impl RunningMetrics {
    fn push(&mut self, step: &MetaStep) {
        self.pre.push(step.pre);
        self.post.push(step.last());
    }

    /// The means so far, forgetting everything.
    fn take(&mut self) -> (StepMetrics, StepMetrics) {
        let pre = StepMetrics::mean(self.pre.drain(..));
        let post = StepMetrics::mean(self.post.drain(..));
        (pre, post)
    }
}

pub(super) fn write_metrics<W: ScalarWriter + ?Sized>(
    writer: &mut W,
    prefix: &str,
    metrics: &StepMetrics,
    step: usize,
) -> Result<()> {
    let values = [
        ("loss", metrics.loss),
        ("precision", metrics.prf.precision),
        ("recall", metrics.prf.recall),
        ("F1", metrics.prf.f1),
    ];

    for (name, value) in values {
        writer.add_scalar(&format!("{prefix} {name}"), value, step)?;
    }

    Ok(())
}

/// Meta-trains `maml` for `config.iterations` outer steps, then saves its parameters.
///
/// Every `log_frequency` iterations the running training averages are summarized and logged
/// as `Inner *` scalars. Every `test_log_frequency` iterations a validation batch is evaluated
/// and logged as `Outer *` scalars. Neither happens at iteration 0.
///
/// # Returns
/// The last iteration and the checkpoint path, or the first error of any step.
pub fn meta_train<S, W>(
    maml: &mut Maml,
    sampler: &mut S,
    writer: &mut W,
    config: &MamlConfig,
) -> Result<TrainSummary>
where
    S: TaskSampler + ?Sized,
    W: ScalarWriter + ?Sized,
{
    let codec = *maml.codec();
    let mut running = RunningMetrics::default();
    let mut start = Instant::now();
    let mut last_itr = 0;

    for itr in 0..config.iterations {
        let tasks = sample_tasks(
            sampler,
            config.meta_batch_size,
            Split::Train,
            config.sampling_mode,
            &codec,
        )?;

        let step = maml.train_step(&tasks)?;
        running.push(&step);
        last_itr = itr;

        if itr != 0 && itr % config.log_frequency == 0 {
            let (pre, post) = running.take();

            info!(
                "Iteration {itr}: pre-inner train loss/prec./rec./F1: {pre}, post-inner train loss/prec./rec./F1: {post}, time elapsed: {:.4}s",
                start.elapsed().as_secs_f32()
            );

            write_metrics(writer, "Inner", &post, itr)?;
            start = Instant::now();
        }

        if itr != 0 && itr % config.test_log_frequency == 0 {
            let tasks = sample_tasks(
                sampler,
                config.meta_batch_size,
                Split::Val,
                config.sampling_mode,
                &codec,
            )?;

            let step = maml.eval_step(&tasks)?;
            let post = step.last();

            info!(
                "Meta-val. pre-inner loss/prec./rec./F1: {}, meta-val. post-inner loss/prec./rec./F1: {post}",
                step.pre
            );

            write_metrics(writer, "Outer", &post, itr)?;
        }
    }

    writer.flush()?;
    let checkpoint = checkpoint::save(maml.params(), &config.checkpoint_dir(), last_itr)?;

    Ok(TrainSummary {
        last_itr,
        checkpoint,
    })
}
