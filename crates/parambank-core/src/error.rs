//! Parameter store errors.

use thiserror::Error;

use crate::class::ParameterClass;
use crate::types::Shape;

/// Errors raised while building, reading, or mutating a parameter store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("missing values for: {}", .names.join(", "))]
    MissingValues { names: Vec<String> },

    #[error("type mismatch for `{name}`: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("size mismatch for `{name}`: expected {expected}, found {found}")]
    SizeMismatch {
        name: String,
        expected: Shape,
        found: Shape,
    },

    #[error("invalid locator: {reason}")]
    InvalidLocator { reason: String },

    #[error("operation `{operation}` does not handle {class} values")]
    UnhandledClass {
        class: ParameterClass,
        operation: &'static str,
    },

    #[error("values remain symbolic after substitution: {}", .names.join(", "))]
    Unresolved { names: Vec<String> },

    #[error("unknown value `{name}`")]
    UnknownValue { name: String },

    #[error("`{name}` is dependency-derived and has no storage slot")]
    DerivedValue { name: String },

    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
}
