use machine_learning::{
    arch::Model,
    autodiff::{GradMode, Var, grad},
    params::Weights,
};
use ndarray::Array2;

use super::InnerLearningRate;
use crate::{
    MamlErr, Result,
    labels::LabelCodec,
    metrics::{StepMetrics, precision_recall_f1},
    task::Task,
};

/// What adapting to one task produced.
#[derive(Debug, Clone)]
pub struct AdapterResult {
    /// The shared weights evaluated on the support set.
    pub pre: StepMetrics,
    /// The adapted weights evaluated on the query set, one entry per inner step.
    pub post: Vec<StepMetrics>,
    pub support_logits: Array2<f32>,
    pub query_logits: Vec<Array2<f32>>,
    /// The query loss after the last inner step, still connected to the shared weights.
    pub final_query_loss: Var,
}

/// The inner loop: gradient descent on a task's support set starting from the shared weights.
///
/// Adapting is a pure function of the task and the weights it is given, the caller's weights
/// are never touched.
pub struct TaskAdapter<'m> {
    model: &'m dyn Model,
    codec: LabelCodec,
    support_size: usize,
    num_inner_updates: usize,
    mode: GradMode,
}

impl<'m> TaskAdapter<'m> {
    /// Creates a new `TaskAdapter`.
    ///
    /// # Arguments
    /// * `model` - The model to adapt.
    /// * `codec` - The label scheme the task labels are encoded with.
    /// * `support_size` - The declared size of the support and query sets.
    /// * `num_inner_updates` - The amount of gradient steps per task.
    /// * `mode` - `GradMode::Graph` to differentiate through the inner gradients afterwards,
    ///   `GradMode::Detached` otherwise.
    pub fn new(
        model: &'m dyn Model,
        codec: LabelCodec,
        support_size: usize,
        num_inner_updates: usize,
        mode: GradMode,
    ) -> Self {
        Self {
            model,
            codec,
            support_size,
            num_inner_updates,
            mode,
        }
    }

    pub fn num_inner_updates(&self) -> usize {
        self.num_inner_updates
    }

    /// Adapts `weights` to `task`.
    ///
    /// # Returns
    /// The pre-update support metrics, the post-update query metrics of every inner step and the
    /// final query loss, or an error if the task does not have the declared size or a weight is
    /// missing.
    pub fn adapt(&self, task: &Task, weights: &Weights, lr: &InnerLearningRate) -> Result<AdapterResult> {
        self.check_task(task)?;

        let support_x = Var::constant(task.support_inputs().clone());
        let support_y = Var::constant(task.support_labels().clone());
        let query_x = Var::constant(task.query_inputs().clone());
        let query_y = Var::constant(task.query_labels().clone());
        let support_sets = self.codec.decode_targets(task.support_labels());
        let query_sets = self.codec.decode_targets(task.query_labels());

        let (support_logits, mut support_loss) = self.evaluate(&support_x, &support_y, weights)?;
        let pre = self.metrics(&support_logits, &support_loss, &support_sets);

        let mut post = Vec::with_capacity(self.num_inner_updates);
        let mut query_logits = Vec::with_capacity(self.num_inner_updates);
        let mut final_query_loss = None;
        let mut current = weights.clone();

        for step in 0..self.num_inner_updates {
            if step > 0 {
                support_loss = self.evaluate(&support_x, &support_y, &current)?.1;
            }

            current = self.descend(&support_loss, &current, lr, step)?;

            let (logits, loss) = self.evaluate(&query_x, &query_y, &current)?;
            post.push(self.metrics(&logits, &loss, &query_sets));
            query_logits.push(logits.value().clone());
            final_query_loss = Some(loss);
        }

        let final_query_loss = final_query_loss.ok_or(MamlErr::TaskShape {
            what: "inner updates",
            got: 0,
            expected: 1,
        })?;

        Ok(AdapterResult {
            pre,
            post,
            support_logits: support_logits.value().clone(),
            query_logits,
            final_query_loss,
        })
    }

    /// One inner gradient step on the support set of `task`, starting from `weights`.
    ///
    /// # Returns
    /// The next snapshot, with the same keys as `weights`.
    pub fn inner_update(
        &self,
        task: &Task,
        weights: &Weights,
        lr: &InnerLearningRate,
        step: usize,
    ) -> Result<Weights> {
        self.check_task(task)?;

        let x = Var::constant(task.support_inputs().clone());
        let y = Var::constant(task.support_labels().clone());
        let (_, loss) = self.evaluate(&x, &y, weights)?;

        self.descend(&loss, weights, lr, step)
    }

    fn descend(
        &self,
        loss: &Var,
        weights: &Weights,
        lr: &InnerLearningRate,
        step: usize,
    ) -> Result<Weights> {
        let wrt: Vec<Var> = weights.values().cloned().collect();
        let grads = grad(loss, &wrt, self.mode)?;

        weights
            .iter()
            .zip(&grads)
            .map(|((key, w), g)| lr.apply(key, step, w, g).map(|next| (key.clone(), next)))
            .collect()
    }

    fn evaluate(&self, x: &Var, y: &Var, weights: &Weights) -> Result<(Var, Var)> {
        let logits = self.model.forward(x, weights)?;
        let loss = self.codec.loss_fn().loss(&logits, y)?;
        Ok((logits, loss))
    }

    fn metrics(&self, logits: &Var, loss: &Var, y_true: &Array2<bool>) -> StepMetrics {
        let y_pred = self.codec.decode_logits(logits.value());

        StepMetrics {
            loss: loss.item(),
            prf: precision_recall_f1(y_true, &y_pred),
        }
    }

    fn check_task(&self, task: &Task) -> Result<()> {
        let sizes = [
            ("support set size", task.support_inputs().nrows()),
            ("query set size", task.query_inputs().nrows()),
        ];

        for (what, got) in sizes {
            if got != self.support_size {
                return Err(MamlErr::TaskShape {
                    what,
                    got,
                    expected: self.support_size,
                });
            }
        }

        Ok(())
    }
}
