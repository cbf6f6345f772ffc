//! # Error Types
//!
//! Parse failures for the shared identifier and key types.

use thiserror::Error;

/// Errors raised while constructing shared types from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Currency ticker outside the closed set.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Identifier is not a valid UUID.
    #[error("Invalid {kind}: {value}")]
    InvalidId { kind: &'static str, value: String },

    /// Allocation target type is empty or contains unsupported characters.
    #[error("Invalid target type: {0:?}")]
    InvalidTargetType(String),

    /// Month key is not `YYYY-MM` or `YYYY-MM-01`.
    #[error("Invalid month key: {0}")]
    InvalidMonthKey(String),
}
