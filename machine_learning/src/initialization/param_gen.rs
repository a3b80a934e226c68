use ndarray::Array2;

/// Generates the initial value of a parameter.
pub trait ParamGen {
    /// A new `(rows, cols)` matrix, filled in row-major order.
    fn generate(&mut self, shape: (usize, usize)) -> Array2<f32>;
}
