use std::{fmt, io, path::PathBuf};

use machine_learning::MlErr;

/// The result type used across the meta-learning crate.
pub type Result<T> = std::result::Result<T, MamlErr>;

/// All errors that can occur while meta-training or meta-testing.
#[derive(Debug)]
pub enum MamlErr {
    /// Invalid configuration, caught before any work starts.
    InvalidConfig(String),
    /// A task or batch does not have the declared sizes.
    TaskShape {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A multi-hot row with no active label cannot be powerset encoded.
    EmptyLabelSet { row: usize },
    /// A task batch with no tasks.
    EmptyBatch,
    /// A checkpoint lacks a tensor the model needs.
    MissingTensor { name: String },
    /// There is no checkpoint to restore under the given directory.
    NoCheckpoint { dir: PathBuf },
    /// A model, autodiff or optimizer error.
    Ml(MlErr),
    Checkpoint(safetensors::SafeTensorError),
    Json(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for MamlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::TaskShape {
                what,
                got,
                expected,
            } => write!(f, "task shape mismatch in {what}: got {got}, expected {expected}"),
            Self::EmptyLabelSet { row } => {
                write!(f, "row {row} has no active label, it has no powerset class")
            }
            Self::EmptyBatch => write!(f, "the task batch is empty"),
            Self::MissingTensor { name } => write!(f, "checkpoint has no tensor '{name}'"),
            Self::NoCheckpoint { dir } => write!(f, "no checkpoint found in {}", dir.display()),
            Self::Ml(e) => write!(f, "{e}"),
            Self::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for MamlErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for MamlErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<safetensors::SafeTensorError> for MamlErr {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(e)
    }
}

impl From<serde_json::Error> for MamlErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for MamlErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
