use std::fmt;

use log::info;

use super::{meta_train::write_metrics, sample_tasks};
use crate::{
    Result, checkpoint,
    config::MamlConfig,
    dataset::{Split, TaskSampler},
    maml::Maml,
    metrics::ConfidenceInterval,
    scalars::ScalarWriter,
};

/// The final-step query metrics of a meta-test run, as 95% confidence intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaTestReport {
    /// The iteration of the restored checkpoint.
    pub checkpoint_itr: usize,
    pub loss: ConfidenceInterval,
    pub precision: ConfidenceInterval,
    pub recall: ConfidenceInterval,
    pub f1: ConfidenceInterval,
}

impl fmt::Display for MetaTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mean meta-test loss: {}", self.loss)?;
        writeln!(f, "Mean meta-test precision: {}", self.precision)?;
        writeln!(f, "Mean meta-test recall: {}", self.recall)?;
        write!(f, "Mean meta-test F1: {}", self.f1)
    }
}

/// Restores the latest checkpoint of the experiment into `maml` and evaluates it on
/// `config.num_meta_test_points` single test tasks.
///
/// The sampler is reseeded with `config.meta_test_seed` first, so two runs over the same
/// checkpoint see the same tasks.
pub fn meta_test<S, W>(
    maml: &mut Maml,
    sampler: &mut S,
    writer: &mut W,
    config: &MamlConfig,
) -> Result<MetaTestReport>
where
    S: TaskSampler + ?Sized,
    W: ScalarWriter + ?Sized,
{
    let (checkpoint_itr, path) = checkpoint::latest(&config.checkpoint_dir())?;
    info!("Restoring model weights from {}", path.display());
    checkpoint::restore(maml.params_mut(), &path)?;

    sampler.reseed(config.meta_test_seed);
    let codec = *maml.codec();

    let points = config.num_meta_test_points;
    let (mut loss, mut precision, mut recall, mut f1) = (
        Vec::with_capacity(points),
        Vec::with_capacity(points),
        Vec::with_capacity(points),
        Vec::with_capacity(points),
    );

    for itr in 0..points {
        let tasks = sample_tasks(sampler, 1, Split::Test, config.sampling_mode, &codec)?;
        let post = maml.eval_step(&tasks)?.last();

        loss.push(post.loss);
        precision.push(post.prf.precision);
        recall.push(post.prf.recall);
        f1.push(post.prf.f1);

        write_metrics(writer, "Meta-test", &post, itr)?;
    }

    writer.flush()?;

    Ok(MetaTestReport {
        checkpoint_itr,
        loss: ConfidenceInterval::from_samples(&loss),
        precision: ConfidenceInterval::from_samples(&precision),
        recall: ConfidenceInterval::from_samples(&recall),
        f1: ConfidenceInterval::from_samples(&f1),
    })
}
