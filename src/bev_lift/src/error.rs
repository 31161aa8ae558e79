//! Error types for the view transformer.

use bev_pool_ops::PoolOpsError;
use thiserror::Error;

/// Errors from grid construction, geometry and pooling.
#[derive(Error, Debug)]
pub enum LiftError {
    #[error("invalid grid config for axis {axis}: {reason}")]
    InvalidGrid { axis: &'static str, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{what} of batch {batch}, camera {camera} is not invertible")]
    SingularTransform {
        what: &'static str,
        batch: usize,
        camera: usize,
    },

    #[error("index space of {0} entries exceeds 32-bit ranks")]
    TooManyPoints(usize),

    #[error("{0} is not supported by the configured transformer variant")]
    Unsupported(&'static str),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("pooling primitive failed: {0}")]
    Pool(#[from] PoolOpsError),
}

pub type Result<T> = std::result::Result<T, LiftError>;

/// Fail with [`LiftError::ShapeMismatch`] unless `found == expected`.
pub(crate) fn ensure_shape(what: &'static str, found: &[usize], expected: &[usize]) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(LiftError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            found: found.to_vec(),
        })
    }
}
