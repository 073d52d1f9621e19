//! Layout planning errors.

use thiserror::Error;

/// Errors that can occur while planning a buffer layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("`{name}` cannot be stored: {reason}")]
    Unstorable { name: String, reason: String },

    #[error("duplicate value `{0}` in universe")]
    DuplicateValue(String),

    #[error("alias `{alias}` refers to both `{first}` and `{second}`")]
    AliasConflict {
        alias: String,
        first: String,
        second: String,
    },

    #[error("dependency equation for undeclared value `{0}`")]
    UnknownDependency(String),

    #[error("duplicate dependency equation for `{0}`")]
    DuplicateDependency(String),

    #[error("failed to fingerprint layout: {0}")]
    Fingerprint(String),
}
