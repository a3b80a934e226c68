use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: String,
        got: (usize, usize),
        expected: (usize, usize),
    },
    MissingParam {
        name: String,
    },
    NonScalarOutput {
        shape: (usize, usize),
    },
    UnsupportedModel {
        name: String,
        supported: Vec<&'static str>,
    },
    InvalidDistribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a shape mismatch in {what}, got {got:?} and expected {expected:?}"
            ),
            MlErr::MissingParam { name } => {
                write!(f, "The parameter '{name}' is missing from the given weights")
            }
            MlErr::NonScalarOutput { shape } => write!(
                f,
                "Gradients can only be taken of a scalar output, got shape {shape:?}"
            ),
            MlErr::UnsupportedModel { name, supported } => write!(
                f,
                "Model name '{name}' is not supported, expected one of {}",
                supported.join(", ")
            ),
            MlErr::InvalidDistribution(detail) => {
                write!(f, "Invalid parameter distribution: {detail}")
            }
        }
    }
}

impl Error for MlErr {}
