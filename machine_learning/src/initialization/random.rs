use std::{cell::RefCell, rc::Rc};

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::ParamGen;
use crate::{MlErr, Result};

/// Samples every parameter from a distribution.
///
/// Generators may share their `rng`, so a whole model is initialized from one seeded stream
/// and the order in which parameters are generated matters.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    pub fn new(rng: Rc<RefCell<R>>, distribution: D) -> Self {
        Self { rng, distribution }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Uniform over `[low, high)`.
    ///
    /// # Returns
    /// An error if the range is empty.
    pub fn uniform(rng: Rc<RefCell<R>>, low: f32, high: f32) -> Result<Self> {
        let distribution =
            Uniform::new(low, high).map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

        Ok(Self::new(rng, distribution))
    }

    /// Glorot uniform, over `±sqrt(6 / (fan_in + fan_out))`.
    pub fn xavier_uniform(rng: Rc<RefCell<R>>, fan_in: usize, fan_out: usize) -> Result<Self> {
        let limit = (6. / (fan_in + fan_out) as f32).sqrt();
        Self::uniform(rng, -limit, limit)
    }
}

impl<R: Rng> RandParamGen<R, Normal<f32>> {
    /// # Returns
    /// An error if `std_dev` is negative or not finite.
    pub fn normal(rng: Rc<RefCell<R>>, mean: f32, std_dev: f32) -> Result<Self> {
        let distribution =
            Normal::new(mean, std_dev).map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

        Ok(Self::new(rng, distribution))
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn generate(&mut self, shape: (usize, usize)) -> Array2<f32> {
        let mut rng = self.rng.borrow_mut();
        Array2::from_shape_simple_fn(shape, || self.distribution.sample(&mut *rng))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn seeded_rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn xavier_uniform_stays_in_range() {
        let limit = (6f32 / 59.).sqrt();
        let kernel = RandParamGen::xavier_uniform(seeded_rng(), 27, 32)
            .unwrap()
            .generate((27, 32));

        assert!(kernel.iter().all(|x| (-limit..limit).contains(x)));
    }

    #[test]
    fn same_seed_same_values() {
        let a = RandParamGen::normal(seeded_rng(), 0., 0.01).unwrap().generate((2, 4));
        let b = RandParamGen::normal(seeded_rng(), 0., 0.01).unwrap().generate((2, 4));

        assert_eq!(a, b);
    }

    #[test]
    fn shared_rng_advances_across_generators() {
        let rng = seeded_rng();
        let a = RandParamGen::normal(rng.clone(), 0., 1.).unwrap().generate((1, 4));
        let b = RandParamGen::normal(rng, 0., 1.).unwrap().generate((1, 4));

        assert_ne!(a, b);
    }

    #[test]
    fn invalid_distributions_are_rejected() {
        assert!(matches!(
            RandParamGen::uniform(seeded_rng(), 1., 1.),
            Err(MlErr::InvalidDistribution(_))
        ));
        assert!(matches!(
            RandParamGen::normal(seeded_rng(), 0., f32::NAN),
            Err(MlErr::InvalidDistribution(_))
        ));
    }
}
