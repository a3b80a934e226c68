use super::{LossFn, loss_fn::check_targets};
use crate::{Result, autodiff::Var};

/// Softmax cross entropy against one-hot (or soft) targets, averaged over the examples.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftmaxCrossEntropy;

impl LossFn for SoftmaxCrossEntropy {
    fn loss(&self, logits: &Var, targets: &Var) -> Result<Var> {
        check_targets(logits, targets)?;

        // -Σ y log softmax(z) = Σ y · (lse(z) - z) and Σ y = 1 per row.
        let per_example = logits
            .logsumexp_rows()
            .mul(&targets.sum_cols())
            .sub(&logits.mul(targets).sum_cols());

        Ok(per_example.mean_all())
    }
}

/// Independent sigmoid cross entropy per label, averaged over examples and labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigmoidCrossEntropy;

impl LossFn for SigmoidCrossEntropy {
    fn loss(&self, logits: &Var, targets: &Var) -> Result<Var> {
        check_targets(logits, targets)?;

        // -y log σ(z) - (1 - y) log(1 - σ(z)) = softplus(z) - y z
        Ok(logits.softplus().sub(&logits.mul(targets)).mean_all())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;
    use crate::MlErr;

    fn row(values: &[f32]) -> Var {
        Var::constant(Array2::from_shape_vec((1, values.len()), values.to_vec()).unwrap())
    }

    #[test]
    fn softmax_cross_entropy_of_uniform_logits() {
        let logits = Var::constant(array![[0., 0., 0., 0.], [0., 0., 0., 0.]]);
        let targets = Var::constant(array![[1., 0., 0., 0.], [0., 0., 1., 0.]]);

        let loss = SoftmaxCrossEntropy.loss(&logits, &targets).unwrap();

        assert!((loss.item() - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn softmax_cross_entropy_is_stable_for_large_logits() {
        let logits = Var::constant(array![[1000., 0.]]);
        let targets = Var::constant(array![[0., 1.]]);

        let loss = SoftmaxCrossEntropy.loss(&logits, &targets).unwrap();

        assert!((loss.item() - 1000.).abs() < 1e-3);
    }

    #[test]
    fn sigmoid_cross_entropy_matches_the_definition() {
        let z: [f32; 3] = [0.3, -2., 4.];
        let y: [f32; 3] = [1., 0., 1.];
        let expected = z
            .iter()
            .zip(&y)
            .map(|(z, y)| {
                let p = 1. / (1. + (-z).exp());
                -(y * p.ln() + (1. - y) * (1. - p).ln())
            })
            .sum::<f32>()
            / 3.;

        let loss = SigmoidCrossEntropy
            .loss(&row(&z), &row(&y))
            .unwrap();

        assert!((loss.item() - expected).abs() < 1e-5);
    }

    #[test]
    fn target_shape_must_match() {
        let logits = Var::constant(array![[0., 0.]]);
        let targets = Var::constant(array![[1., 0., 0.]]);

        assert!(matches!(
            SigmoidCrossEntropy.loss(&logits, &targets),
            Err(MlErr::ShapeMismatch { .. })
        ));
    }
}
