use crate::autodiff::Var;

const EPSILON: f32 = 1e-3;

/// Normalizes every column of `x` with the mean and variance of that column over the batch.
///
/// There are no running statistics, training and evaluation see the same function.
pub fn batch_norm(x: &Var) -> Var {
    let rows = x.shape().0;
    let inv_rows = 1. / rows.max(1) as f32;

    let mean = x.sum_rows().scale(inv_rows);
    let centered = x.sub(&mean.broadcast_rows(rows));
    let var = centered.powf(2.).sum_rows().scale(inv_rows);
    let inv_std = var.shift(EPSILON).powf(-0.5);

    centered.mul(&inv_std.broadcast_rows(rows))
}

#[cfg(test)]
mod tests {
    use ndarray::{Axis, array};

    use super::*;

    #[test]
    fn columns_are_standardized() {
        let x = Var::constant(array![[1., 10.], [2., 20.], [3., 30.], [6., 0.]]);

        let y = batch_norm(&x);

        for col in y.value().axis_iter(Axis(1)) {
            let mean = col.mean().unwrap();
            let var = col.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.).abs() < 1e-2);
        }
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let y = batch_norm(&Var::constant(array![[4.], [4.], [4.]]));
        assert!(y.value().iter().all(|v| *v == 0.));
    }
}
