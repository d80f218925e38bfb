// This module defines the error taxonomy for module compilation using thiserror. CompileError
// covers every way a compilation attempt can fail: buffer assignment failures reported by the
// external assigner, argument types that carry no shape during allocation reconstruction,
// unexpected argument attributes, emitter failures, output correlation failures and constant
// descriptors whose global is missing from the generated module. Each variant carries the
// context needed to diagnose it. CompileResult<T> is the alias used across the crate.

//! Error types for module compilation.

use thiserror::Error;

/// Main error type for a compilation attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Buffer assignment failed: {reason}")]
    BufferAssignment {
        reason: String,
    },

    #[error("Argument {index} has unsupported type `{ty}`")]
    UnsupportedType {
        index: usize,
        ty: String,
    },

    #[error("Argument {index} carries unexpected attribute `{key}`")]
    SchemaViolation {
        index: usize,
        key: String,
    },

    #[error("IR emission failed: {reason}")]
    Emission {
        reason: String,
    },

    #[error("Output correlation failed: {reason}")]
    OutputCorrelation {
        reason: String,
    },

    #[error("Constant `{symbol}` has no matching global in the module")]
    ConsistencyViolation {
        symbol: String,
    },
}

impl CompileError {
    pub fn emission(reason: impl Into<String>) -> Self {
        CompileError::Emission { reason: reason.into() }
    }

    pub fn buffer_assignment(reason: impl Into<String>) -> Self {
        CompileError::BufferAssignment { reason: reason.into() }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
