use ndarray::{Array2, Array3, Axis, s};

use crate::{MamlErr, Result, labels::LabelCodec};

/// One few-shot task: a support set to adapt on and a query set of the same size to score the
/// adapted weights on. Labels are already encoded for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    support_inputs: Array2<f32>,
    query_inputs: Array2<f32>,
    support_labels: Array2<f32>,
    query_labels: Array2<f32>,
}

impl Task {
    /// Creates a new `Task`.
    ///
    /// # Returns
    /// The task or an error if the support and query sets differ in size, or a label matrix
    /// does not have one row per input.
    pub fn new(
        support_inputs: Array2<f32>,
        query_inputs: Array2<f32>,
        support_labels: Array2<f32>,
        query_labels: Array2<f32>,
    ) -> Result<Self> {
        let checks = [
            ("query set size", query_inputs.nrows(), support_inputs.nrows()),
            ("support label rows", support_labels.nrows(), support_inputs.nrows()),
            ("query label rows", query_labels.nrows(), query_inputs.nrows()),
            ("query input width", query_inputs.ncols(), support_inputs.ncols()),
            ("query label width", query_labels.ncols(), support_labels.ncols()),
        ];

        for (what, got, expected) in checks {
            if got != expected {
                return Err(MamlErr::TaskShape {
                    what,
                    got,
                    expected,
                });
            }
        }

        Ok(Self {
            support_inputs,
            query_inputs,
            support_labels,
            query_labels,
        })
    }

    pub fn support_inputs(&self) -> &Array2<f32> {
        &self.support_inputs
    }

    pub fn query_inputs(&self) -> &Array2<f32> {
        &self.query_inputs
    }

    pub fn support_labels(&self) -> &Array2<f32> {
        &self.support_labels
    }

    pub fn query_labels(&self) -> &Array2<f32> {
        &self.query_labels
    }

    /// The amount of examples in each of the support and query sets.
    pub fn size(&self) -> usize {
        self.support_inputs.nrows()
    }
}

/// Splits sampled tasks into support and query halves and encodes their labels.
///
/// # Arguments
/// * `inputs` - `(tasks, 2 * support_size, features)` examples.
/// * `labels` - `(tasks, 2 * support_size, k)` multi-hot labels.
/// * `codec` - How to encode the labels.
///
/// # Returns
/// One task per entry of the first axis, the first half of the examples being the support set.
pub fn support_query_split(
    inputs: &Array3<f32>,
    labels: &Array3<f32>,
    codec: &LabelCodec,
) -> Result<Vec<Task>> {
    let (tasks, examples, _) = inputs.dim();
    let (label_tasks, label_examples, _) = labels.dim();

    if label_tasks != tasks {
        return Err(MamlErr::TaskShape {
            what: "label tasks",
            got: label_tasks,
            expected: tasks,
        });
    }

    if label_examples != examples {
        return Err(MamlErr::TaskShape {
            what: "label examples",
            got: label_examples,
            expected: examples,
        });
    }

    if examples % 2 != 0 {
        return Err(MamlErr::TaskShape {
            what: "examples per task",
            got: examples,
            expected: examples + 1,
        });
    }

    let half = examples / 2;

    inputs
        .axis_iter(Axis(0))
        .zip(labels.axis_iter(Axis(0)))
        .map(|(x, y)| {
            Task::new(
                x.slice(s![..half, ..]).to_owned(),
                x.slice(s![half.., ..]).to_owned(),
                codec.encode(y.slice(s![..half, ..]))?,
                codec.encode(y.slice(s![half.., ..]))?,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, array};

    use super::*;
    use crate::labels::LabelScheme;

    #[test]
    fn halves_become_support_and_query() {
        let inputs = Array3::from_shape_fn((2, 4, 3), |(t, e, d)| (t * 100 + e * 10 + d) as f32);
        let labels = Array3::from_shape_fn((2, 4, 2), |(_, e, l)| ((e + l) % 2) as f32);
        let codec = LabelCodec::new(LabelScheme::Powerset, 2);

        let tasks = support_query_split(&inputs, &labels, &codec).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].size(), 2);
        assert_eq!(tasks[1].support_inputs().row(0), array![100., 101., 102.]);
        assert_eq!(tasks[1].query_inputs().row(0), array![120., 121., 122.]);
        // Example 0 has label 1 only (class 1), example 1 has label 0 only (class 0).
        assert_eq!(
            tasks[0].support_labels(),
            &array![[0., 1., 0.], [1., 0., 0.]]
        );
    }

    #[test]
    fn odd_example_counts_are_rejected() {
        let inputs = Array3::zeros((1, 3, 2));
        let labels = Array3::ones((1, 3, 2));
        let codec = LabelCodec::new(LabelScheme::BinRel, 2);

        assert!(matches!(
            support_query_split(&inputs, &labels, &codec),
            Err(MamlErr::TaskShape { .. })
        ));
    }

    #[test]
    fn support_and_query_sizes_must_match() {
        let result = Task::new(
            Array2::zeros((4, 2)),
            Array2::zeros((3, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((3, 1)),
        );

        assert!(matches!(
            result,
            Err(MamlErr::TaskShape {
                what: "query set size",
                got: 3,
                expected: 4
            })
        ));
    }
}
