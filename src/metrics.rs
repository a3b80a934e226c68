use std::{fmt, ops::Add};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Precision, recall and F1 of a set of predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Prf {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl Add for Prf {
    type Output = Prf;

    fn add(self, rhs: Prf) -> Prf {
        Prf {
            precision: self.precision + rhs.precision,
            recall: self.recall + rhs.recall,
            f1: self.f1 + rhs.f1,
        }
    }
}

impl Prf {
    fn scale(self, s: f32) -> Prf {
        Prf {
            precision: self.precision * s,
            recall: self.recall * s,
            f1: self.f1 * s,
        }
    }
}

/// Micro-averaged precision, recall and F1 of predicted label sets.
///
/// Every (example, label) pair counts once. A ratio with a zero denominator is 0.
///
/// # Arguments
/// * `y_true` - The `(n, k)` true label sets.
/// * `y_pred` - The `(n, k)` predicted label sets.
pub fn precision_recall_f1(y_true: &Array2<bool>, y_pred: &Array2<bool>) -> Prf {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);

    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0. {
        2. * precision * recall / (precision + recall)
    } else {
        0.
    };

    Prf {
        precision,
        recall,
        f1,
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 { 0. } else { num as f32 / den as f32 }
}

/// The loss and metrics of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub loss: f32,
    pub prf: Prf,
}

impl Add for StepMetrics {
    type Output = StepMetrics;

    fn add(self, rhs: StepMetrics) -> StepMetrics {
        StepMetrics {
            loss: self.loss + rhs.loss,
            prf: self.prf + rhs.prf,
        }
    }
}

impl StepMetrics {
    /// The element-wise mean, all zeros for no items.
    pub fn mean<I: IntoIterator<Item = StepMetrics>>(items: I) -> StepMetrics {
        let (count, total) = items
            .into_iter()
            .fold((0usize, StepMetrics::default()), |(n, acc), m| (n + 1, acc + m));

        if count == 0 {
            return total;
        }

        let s = 1. / count as f32;
        StepMetrics {
            loss: total.loss * s,
            prf: total.prf.scale(s),
        }
    }
}

impl fmt::Display for StepMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.5}/{:.5}/{:.5}/{:.5}",
            self.loss, self.prf.precision, self.prf.recall, self.prf.f1
        )
    }
}

/// A sample mean with the half-width of its 95% confidence interval, `1.96 * std / sqrt(n)`
/// where `std` is the population standard deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub mean: f32,
    pub half_width: f32,
}

impl ConfidenceInterval {
    pub fn from_samples(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let n = samples.len() as f32;
        let mean = samples.iter().sum::<f32>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;

        Self {
            mean,
            half_width: 1.96 * var.sqrt() / n.sqrt(),
        }
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +/- {}", self.mean, self.half_width)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn micro_averaged_counts() {
        let y_true = array![[true, false, true], [false, true, false]];
        let y_pred = array![[true, true, false], [false, true, false]];

        // tp 2, fp 1, fn 1
        let prf = precision_recall_f1(&y_true, &y_pred);

        assert!((prf.precision - 2. / 3.).abs() < 1e-6);
        assert!((prf.recall - 2. / 3.).abs() < 1e-6);
        assert!((prf.f1 - 2. / 3.).abs() < 1e-6);
    }

    #[test]
    fn perfect_predictions() {
        let y = array![[true, false], [true, true]];
        assert_eq!(
            precision_recall_f1(&y, &y),
            Prf {
                precision: 1.,
                recall: 1.,
                f1: 1.
            }
        );
    }

    #[test]
    fn zero_denominators_give_zero() {
        let y_true = array![[false, false]];
        let y_pred = array![[false, false]];
        assert_eq!(precision_recall_f1(&y_true, &y_pred), Prf::default());

        let y_true = array![[true, false]];
        let y_pred = array![[false, false]];
        let prf = precision_recall_f1(&y_true, &y_pred);
        assert_eq!(prf.precision, 0.);
        assert_eq!(prf.recall, 0.);
        assert_eq!(prf.f1, 0.);
    }

    #[test]
    fn step_metrics_mean() {
        let a = StepMetrics {
            loss: 1.,
            prf: Prf {
                precision: 0.5,
                recall: 1.,
                f1: 0.,
            },
        };
        let b = StepMetrics {
            loss: 3.,
            prf: Prf {
                precision: 0.,
                recall: 0.,
                f1: 1.,
            },
        };

        let mean = StepMetrics::mean([a, b]);

        assert_eq!(mean.loss, 2.);
        assert_eq!(mean.prf.precision, 0.25);
        assert_eq!(mean.prf.recall, 0.5);
        assert_eq!(mean.prf.f1, 0.5);
        assert_eq!(StepMetrics::mean([]), StepMetrics::default());
    }

    #[test]
    fn confidence_interval() {
        let ci = ConfidenceInterval::from_samples(&[1., 3., 1., 3.]);

        assert_eq!(ci.mean, 2.);
        assert!((ci.half_width - 1.96 * 1. / 2.).abs() < 1e-6);
        assert_eq!(ConfidenceInterval::from_samples(&[]), ConfidenceInterval::default());
    }
}
