use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use log::debug;
use machine_learning::{
    MlErr,
    arch::{Model, build_model},
    autodiff::{GradMode, Var, grad},
    optimization::{Optimizer, OptimizerSpec},
};
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};

use super::{BatchResult, MetaParams, TaskAdapter, run_batch};
use crate::{
    MamlErr, Result,
    config::MamlConfig,
    labels::LabelCodec,
    metrics::StepMetrics,
    task::Task,
};

/// The batch-mean metrics of one outer step.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaStep {
    /// Pre-update support metrics.
    pub pre: StepMetrics,
    /// Post-update query metrics, one entry per inner step.
    pub post: Vec<StepMetrics>,
}

impl MetaStep {
    fn from_batch(batch: &BatchResult) -> Self {
        Self {
            pre: batch.mean_pre(),
            post: batch.mean_post(),
        }
    }

    /// The metrics after the last inner step.
    pub fn last(&self) -> StepMetrics {
        self.post.last().copied().unwrap_or_default()
    }
}

/// The outer loop of model-agnostic meta-learning.
///
/// Owns the model, the meta parameters and the optimizer state. Only [`Maml::train_step`]
/// mutates the parameters, once per call and after every gradient has been computed.
pub struct Maml {
    model: Box<dyn Model>,
    params: MetaParams,
    codec: LabelCodec,
    support_size: usize,
    num_inner_updates: usize,
    first_order: bool,
    optimizer: OptimizerSpec,
    optimizers: BTreeMap<String, Box<dyn Optimizer + Send>>,
}

impl Maml {
    /// Builds the configured model, initializes its weights from the configured seed and sets
    /// up an Adam meta optimizer.
    ///
    /// # Returns
    /// The learner or an error if the model name is not registered.
    pub fn new(config: &MamlConfig) -> Result<Self> {
        let model = build_model(&config.model_class, config.model_spec())?;
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(config.seed)));
        let weights = model.init_params(rng)?;

        let params = MetaParams::new(
            weights,
            config.inner_update_lr,
            config.learn_inner_update_lr,
            config.num_inner_updates,
        );

        debug!(
            model = model.name(),
            trainable = params.num_scalars();
            "initialized meta parameters"
        );

        Ok(Self::from_parts(
            model,
            params,
            config.label_codec(),
            config.support_size,
            config.num_inner_updates,
            OptimizerSpec::adam(config.meta_lr),
        )
        .first_order(config.first_order))
    }

    /// Creates a learner out of already built parts.
    pub fn from_parts(
        model: Box<dyn Model>,
        params: MetaParams,
        codec: LabelCodec,
        support_size: usize,
        num_inner_updates: usize,
        optimizer: OptimizerSpec,
    ) -> Self {
        Self {
            model,
            params,
            codec,
            support_size,
            num_inner_updates,
            first_order: false,
            optimizer,
            optimizers: BTreeMap::new(),
        }
    }

    /// Whether the meta-gradient ignores the dependency of the inner gradients on the shared
    /// weights.
    pub fn first_order(mut self, first_order: bool) -> Self {
        self.first_order = first_order;
        self
    }

    /// Replaces the meta optimizer, dropping any state the previous one had.
    pub fn optimizer(mut self, optimizer: OptimizerSpec) -> Self {
        self.optimizer = optimizer;
        self.optimizers.clear();
        self
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn params(&self) -> &MetaParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut MetaParams {
        &mut self.params
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    fn adapter(&self, mode: GradMode) -> TaskAdapter<'_> {
        TaskAdapter::new(
            self.model.as_ref(),
            self.codec,
            self.support_size,
            self.num_inner_updates,
            mode,
        )
    }

    /// Runs the batch and returns its raw per-task results without updating anything.
    pub fn run(&self, batch: &[Task]) -> Result<BatchResult> {
        let (weights, lr) = self.params.leaves();
        run_batch(&self.adapter(GradMode::Detached), batch, &weights, &lr)
    }

    /// One meta-training step.
    ///
    /// The objective is the mean over tasks of the query loss after the last inner step. Its
    /// gradient with respect to the shared weights (and the learned inner rates) goes through
    /// the inner updates, then a single optimizer step is applied.
    ///
    /// # Returns
    /// The batch-mean metrics, or an error in which case no parameter was changed.
    pub fn train_step(&mut self, batch: &[Task]) -> Result<MetaStep> {
        let mode = if self.first_order {
            GradMode::Detached
        } else {
            GradMode::Graph
        };

        let (weights, lr) = self.params.leaves();
        let result = run_batch(&self.adapter(mode), batch, &weights, &lr)?;

        let objective = result
            .tasks
            .iter()
            .map(|task| task.final_query_loss.clone())
            .reduce(|acc, loss| acc.add(&loss))
            .ok_or(MamlErr::EmptyBatch)?
            .scale(1. / result.len() as f32);

        let mut names: Vec<&String> = weights.keys().collect();
        let mut wrt: Vec<Var> = weights.values().cloned().collect();
        for (name, rate) in lr.leaves() {
            names.push(name);
            wrt.push(rate.clone());
        }

        let grads = grad(&objective, &wrt, GradMode::Detached)?;
        let updates: Vec<(String, Array2<f32>)> = names
            .into_iter()
            .zip(grads)
            .map(|(name, g)| (name.clone(), g.value().clone()))
            .collect();

        self.apply(updates)?;

        debug!(objective = objective.item(); "meta step applied");
        Ok(MetaStep::from_batch(&result))
    }

    /// Evaluates the batch as `train_step` does, without touching any parameter.
    pub fn eval_step(&self, batch: &[Task]) -> Result<MetaStep> {
        Ok(MetaStep::from_batch(&self.run(batch)?))
    }

    /// Applies one optimizer update per parameter, after checking all of them fit.
    fn apply(&mut self, updates: Vec<(String, Array2<f32>)>) -> Result<()> {
        for (name, g) in &updates {
            let current = self.params.get(name)?;

            if current.dim() != g.dim() {
                return Err(MlErr::ShapeMismatch {
                    what: format!("gradient of '{name}'"),
                    got: g.dim(),
                    expected: current.dim(),
                }
                .into());
            }
        }

        for (name, g) in updates {
            let mut value = self.params.get(&name)?.clone();
            let spec = &self.optimizer;
            let optimizer = self
                .optimizers
                .entry(name.clone())
                .or_insert_with(|| spec.build(value.dim()));

            optimizer.update(&g, &mut value)?;
            self.params.store_of_mut(&name)?.assign(&name, value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::{SamplingMode, Split, SyntheticPatches, TaskSampler},
        task::support_query_split,
    };

    fn config() -> MamlConfig {
        MamlConfig {
            support_size: 2,
            meta_batch_size: 2,
            num_filters: 2,
            num_inner_updates: 2,
            label_subset_size: 2,
            img_size: 4,
            channels: 1,
            ..Default::default()
        }
    }

    fn batch(config: &MamlConfig) -> Vec<Task> {
        let mut sampler = SyntheticPatches::new(config.synthetic()).unwrap();
        let sampled = sampler
            .sample_batch(config.meta_batch_size, Split::Train, SamplingMode::Greedy)
            .unwrap();

        support_query_split(&sampled.inputs, &sampled.labels, &config.label_codec()).unwrap()
    }

    #[test]
    fn train_step_updates_the_weights() {
        let config = config();
        let tasks = batch(&config);
        let mut maml = Maml::new(&config).unwrap();
        let before = maml.params().clone();

        let step = maml.train_step(&tasks).unwrap();

        assert_eq!(step.post.len(), 2);
        for key in ["conv1", "w5", "b5"] {
            assert_ne!(before.weights().get(key), maml.params().weights().get(key));
        }
    }

    #[test]
    fn eval_step_does_not_update() {
        let config = config();
        let tasks = batch(&config);
        let maml = Maml::new(&config).unwrap();
        let before = maml.params().clone();

        let step = maml.eval_step(&tasks).unwrap();

        assert_eq!(maml.params(), &before);
        assert_eq!(step.post.len(), 2);
        assert!(step.pre.loss.is_finite());
    }

    #[test]
    fn same_seed_same_step() {
        let config = config();
        let tasks = batch(&config);
        let mut a = Maml::new(&config).unwrap();
        let mut b = Maml::new(&config).unwrap();

        assert_eq!(a.train_step(&tasks).unwrap(), b.train_step(&tasks).unwrap());
        assert_eq!(a.params(), b.params());
    }

    #[test]
    fn empty_batch_leaves_parameters_alone() {
        let mut maml = Maml::new(&config()).unwrap();
        let before = maml.params().clone();

        assert!(matches!(maml.train_step(&[]), Err(MamlErr::EmptyBatch)));
        assert_eq!(maml.params(), &before);
    }

    #[test]
    fn learned_rates_are_trained() {
        let config = MamlConfig {
            learn_inner_update_lr: true,
            ..config()
        };
        let tasks = batch(&config);
        let mut maml = Maml::new(&config).unwrap();

        maml.train_step(&tasks).unwrap();

        let rates = maml.params().inner_lrs().unwrap();
        assert_eq!(rates.len(), maml.params().weights().len() * 2);
        assert!(rates.iter().any(|(_, rate)| rate[[0, 0]] != 0.4));
    }

    #[test]
    fn first_order_differs_from_second_order() {
        let config = config();
        let tasks = batch(&config);
        let sgd = OptimizerSpec::GradientDescent { learning_rate: 1. };
        let mut second = Maml::new(&config).unwrap().optimizer(sgd);
        let mut first = Maml::new(&config).unwrap().optimizer(sgd).first_order(true);

        let a = second.train_step(&tasks).unwrap();
        let b = first.train_step(&tasks).unwrap();

        assert_eq!(a.pre, b.pre);
        assert_ne!(second.params(), first.params());
    }
}
