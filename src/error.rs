use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

/// The result type used in the entire trainer.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// The trainer's error type.
///
/// Numeric problems (NaN losses, empty validation sets) are never reported
/// through this type, they flow through the computed values instead.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Json(serde_json::Error),
    Shape(ShapeError),
    /// Two parameter trees that should line up do not.
    StructureMismatch {
        what: &'static str,
        key: String,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidConfig(String),
    EmptyDataset,
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::Shape(e) => write!(f, "shape error: {e}"),
            TrainErr::StructureMismatch { what, key } => {
                write!(f, "parameter structure mismatch in {what} at '{key}'")
            }
            TrainErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            TrainErr::EmptyDataset => write!(f, "the training set yields no batches"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            TrainErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ShapeError> for TrainErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
