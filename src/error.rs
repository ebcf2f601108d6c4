//! Error types for the workspace/algorithm framework.

use std::collections::BTreeMap;

use thiserror::Error;

/// Framework error type.
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// A single property value was rejected by its validator.
    #[error("Invalid value for property '{property}': {message}")]
    Validation { property: String, message: String },

    /// Pre-execution validation found one or more violations.
    #[error("Invalid properties: {}", format_violations(.0))]
    InvalidProperties(BTreeMap<String, String>),

    #[error("Unknown property: '{0}'")]
    UnknownProperty(String),

    #[error("Property '{0}' is already declared")]
    DuplicateProperty(String),

    /// Spectrum or bin index outside the valid range.
    #[error("Index {index} out of range [0, {len})")]
    Index { index: usize, len: usize },

    /// X/Y/E sizes that violate the histogram or point-data convention.
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// Registry lookup miss.
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' already exists in the data service")]
    DuplicateName(String),

    /// Cooperative cancellation was acknowledged.
    #[error("Algorithm '{0}' was cancelled")]
    Cancelled(String),

    /// A domain algorithm cannot proceed.
    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Algorithm '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("Algorithm '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Unsupported type: '{0}'")]
    UnsupportedType(String),

    /// String-to-typed-value conversion failed.
    #[error("Cannot parse '{value}' as {expected}")]
    Parse { value: String, expected: String },

    /// Output property read before the algorithm executed.
    #[error("Output property '{0}' is not available before execution")]
    OutputNotReady(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl FrameworkError {
    /// Shorthand for [`FrameworkError::Computation`].
    pub fn computation(msg: impl Into<String>) -> Self {
        FrameworkError::Computation(msg.into())
    }

    /// Shorthand for [`FrameworkError::InvalidSize`].
    pub fn invalid_size(msg: impl Into<String>) -> Self {
        FrameworkError::InvalidSize(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FrameworkError::Cancelled(_))
    }
}

fn format_violations(violations: &BTreeMap<String, String>) -> String {
    violations
        .iter()
        .map(|(name, msg)| format!("{name}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FrameworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_properties_lists_every_violation() {
        let mut v = BTreeMap::new();
        v.insert("XMin".to_string(), "XMin must be less than XMax".to_string());
        v.insert("Params".to_string(), "A value must be entered".to_string());
        let msg = FrameworkError::InvalidProperties(v).to_string();
        assert!(msg.contains("XMin: XMin must be less than XMax"));
        assert!(msg.contains("Params: A value must be entered"));
    }

    #[test]
    fn index_error_mentions_bounds() {
        let e = FrameworkError::Index { index: 7, len: 3 };
        assert_eq!(e.to_string(), "Index 7 out of range [0, 3)");
    }
}
