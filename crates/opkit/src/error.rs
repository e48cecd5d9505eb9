//! Error type shared by every stage of the operator pipeline.

use thiserror::Error;

/// Failure raised while deriving schemas, binding arguments, or running kernels.
#[derive(Debug, Error)]
pub enum OpError {
    /// Declared parameters and the node or call disagree on types or arity.
    #[error("schema violation: {message}")]
    SchemaViolation { message: String },
    /// A shape-dependent accessor was used on a tensor with the wrong shape.
    #[error("shape violation: {message}")]
    ShapeViolation { message: String },
    /// The execution context could not provision an output buffer.
    #[error("failed to provision output {index}: {message}")]
    AllocationFailure { index: usize, message: String },
    /// A kernel handle was passed to an operator that did not create it.
    #[error("kernel handle was not created by operator `{op}`")]
    InvalidHandle { op: String },
    /// An operator could not be added to a domain.
    #[error("registration failed: {message}")]
    Registration { message: String },
    /// Any other failure reported by the execution context.
    #[error("engine failure: {message}")]
    Engine { message: String },
    /// Failure reported by the operator body itself.
    #[error("compute failed: {0}")]
    Compute(#[from] anyhow::Error),
}

impl OpError {
    pub fn schema(message: impl Into<String>) -> Self {
        OpError::SchemaViolation {
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        OpError::ShapeViolation {
            message: message.into(),
        }
    }

    pub fn allocation(index: usize, message: impl Into<String>) -> Self {
        OpError::AllocationFailure {
            index,
            message: message.into(),
        }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        OpError::Registration {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        OpError::Engine {
            message: message.into(),
        }
    }

    /// Returns true for [`OpError::SchemaViolation`].
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, OpError::SchemaViolation { .. })
    }

    /// Returns true for [`OpError::ShapeViolation`].
    pub fn is_shape_violation(&self) -> bool {
        matches!(self, OpError::ShapeViolation { .. })
    }
}

pub type OpResult<T> = Result<T, OpError>;
