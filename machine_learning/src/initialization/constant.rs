use ndarray::Array2;

use super::ParamGen;

/// Fills every parameter with the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstParamGen {
    value: f32,
}

impl ConstParamGen {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn zeros() -> Self {
        Self::new(0.)
    }
}

impl ParamGen for ConstParamGen {
    fn generate(&mut self, shape: (usize, usize)) -> Array2<f32> {
        Array2::from_elem(shape, self.value)
    }
}
