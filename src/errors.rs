use thiserror::Error;

use crate::types::TensorId;

#[derive(Error, Debug)]
pub enum GradError {
    #[error("null tensor: {0}")]
    TensorNull(String),
    #[error("incompatible shapes: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
    #[error("buffer of {found} elements does not match shape {shape:?}")]
    DataSizeMismatch { shape: Vec<usize>, found: usize },
    #[error("unsupported shape {shape:?}: {reason}")]
    WrongShape { shape: Vec<usize>, reason: String },
    #[error("operand index {index} out of bounds (limit {limit})")]
    IndexOutOfBounds { index: usize, limit: usize },
    #[error("operand {0:?} has no graph node; only tracked tensors can participate in backward")]
    MissingNode(TensorId),
    #[error("pool exhausted: {0}")]
    OutOfMemory(String),
    #[error("backward root is missing or not gradient-tracked")]
    InvalidRoot,
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GradResult<T> = Result<T, GradError>;
