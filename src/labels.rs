//! Conversion between multi-hot label sets and the targets the model is trained on.
//!
//! With `k` labels, the powerset scheme has one class per non-empty subset. The subset with
//! active labels `{i, j, ...}` is the class `2^i + 2^j + ... - 1`, that is, the multi-hot row
//! read as a little-endian bit string minus one, since the empty set has no class. Binary
//! relevance keeps the multi-hot row as is and predicts every label independently.

use std::{fmt, str::FromStr};

use machine_learning::arch::loss::{LossFn, SigmoidCrossEntropy, SoftmaxCrossEntropy};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{MamlErr, Result};

/// How multi-label targets are presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelScheme {
    #[default]
    Powerset,
    BinRel,
}

impl FromStr for LabelScheme {
    type Err = MamlErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "powerset" => Ok(Self::Powerset),
            "bin_rel" => Ok(Self::BinRel),
            _ => Err(MamlErr::InvalidConfig(format!(
                "unknown multilabel scheme '{s}', expected 'powerset' or 'bin_rel'"
            ))),
        }
    }
}

impl fmt::Display for LabelScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Powerset => f.write_str("powerset"),
            Self::BinRel => f.write_str("bin_rel"),
        }
    }
}

/// A label scheme applied to a fixed amount of labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelCodec {
    scheme: LabelScheme,
    num_labels: usize,
}

impl LabelCodec {
    pub fn new(scheme: LabelScheme, num_labels: usize) -> Self {
        Self { scheme, num_labels }
    }

    pub fn scheme(&self) -> LabelScheme {
        self.scheme
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// The width of the targets and logits, `2^k - 1` for powerset and `k` for binary relevance.
    pub fn dim_output(&self) -> usize {
        match self.scheme {
            LabelScheme::Powerset => (1 << self.num_labels) - 1,
            LabelScheme::BinRel => self.num_labels,
        }
    }

    /// The loss the model is trained with under this scheme.
    pub fn loss_fn(&self) -> &'static dyn LossFn {
        match self.scheme {
            LabelScheme::Powerset => &SoftmaxCrossEntropy,
            LabelScheme::BinRel => &SigmoidCrossEntropy,
        }
    }

    /// Encodes `(n, k)` multi-hot rows into `(n, dim_output)` targets.
    ///
    /// # Returns
    /// The targets or an error if a row is not `k` wide or, under powerset, has no active label.
    pub fn encode(&self, multi_hot: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (n, k) = multi_hot.dim();
        if k != self.num_labels {
            return Err(MamlErr::TaskShape {
                what: "multi-hot label width",
                got: k,
                expected: self.num_labels,
            });
        }

        match self.scheme {
            LabelScheme::BinRel => Ok(multi_hot.mapv(|v| if v > 0.5 { 1. } else { 0. })),
            LabelScheme::Powerset => {
                let mut targets = Array2::zeros((n, self.dim_output()));

                for (row, labels) in multi_hot.axis_iter(Axis(0)).enumerate() {
                    let bits = labels
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| **v > 0.5)
                        .fold(0usize, |acc, (i, _)| acc | (1 << i));

                    if bits == 0 {
                        return Err(MamlErr::EmptyLabelSet { row });
                    }

                    targets[[row, bits - 1]] = 1.;
                }

                Ok(targets)
            }
        }
    }

    /// The label sets predicted by `(n, dim_output)` logits: the most likely subset under
    /// powerset, every label with a positive logit under binary relevance.
    pub fn decode_logits(&self, logits: &Array2<f32>) -> Array2<bool> {
        match self.scheme {
            LabelScheme::Powerset => self.decode_classes(logits),
            LabelScheme::BinRel => logits.mapv(|z| z > 0.),
        }
    }

    /// The label sets encoded by `(n, dim_output)` targets.
    pub fn decode_targets(&self, targets: &Array2<f32>) -> Array2<bool> {
        match self.scheme {
            LabelScheme::Powerset => self.decode_classes(targets),
            LabelScheme::BinRel => targets.mapv(|y| y > 0.5),
        }
    }

    fn decode_classes(&self, scores: &Array2<f32>) -> Array2<bool> {
        let mut sets = Array2::from_elem((scores.nrows(), self.num_labels), false);

        for (row, values) in scores.axis_iter(Axis(0)).enumerate() {
            let class = argmax(values.iter().copied());
            let bits = class + 1;

            for label in 0..self.num_labels {
                sets[[row, label]] = bits & (1 << label) != 0;
            }
        }

        sets
    }
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}
