//! Shared primitives for all Rust crates in rolesync.

#![forbid(unsafe_code)]

/// Per-item failure records collected by batch operations.
pub mod failure;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use failure::{ItemFailure, format_item_failures};

/// Result type used across rolesync crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A managed policy reference could not be turned into a canonical identifier.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Remote call failed in a way that may succeed on a later pass.
    #[error("transient remote error: {0}")]
    TransientRemote(String),

    /// Remote call was rejected and will keep failing until the input changes.
    #[error("permanent remote error: {0}")]
    PermanentRemote(String),

    /// One or more items of a batch failed while the rest of the batch ran.
    #[error("{} item(s) failed: {}", .0.len(), format_item_failures(.0))]
    Aggregate(Vec<ItemFailure>),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether a later delivery of the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientRemote(_) | Self::Resolution(_) | Self::Internal(_) => true,
            Self::Aggregate(failures) => failures.iter().any(|failure| failure.cause.is_retryable()),
            Self::Validation(_) | Self::NotFound(_) | Self::PermanentRemote(_) => false,
        }
    }

    /// Returns whether this error reports an absent resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ItemFailure, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn aggregate_is_retryable_when_any_cause_is_transient() {
        let error = AppError::Aggregate(vec![
            ItemFailure::new(
                "detach_managed_policy",
                "arn:aws:iam::123456789012:policy/a",
                AppError::PermanentRemote("denied".to_owned()),
            ),
            ItemFailure::new(
                "detach_managed_policy",
                "arn:aws:iam::123456789012:policy/b",
                AppError::TransientRemote("throttled".to_owned()),
            ),
        ]);

        assert!(error.is_retryable());
        assert!(!AppError::PermanentRemote("malformed".to_owned()).is_retryable());
    }

    #[test]
    fn aggregate_message_names_every_target() {
        let error = AppError::Aggregate(vec![
            ItemFailure::new(
                "put_inline_policy",
                "p1",
                AppError::PermanentRemote("malformed document".to_owned()),
            ),
            ItemFailure::new(
                "attach_managed_policy",
                "ReadOnly",
                AppError::Resolution("identity lookup failed".to_owned()),
            ),
        ]);

        let message = error.to_string();
        assert!(message.starts_with("2 item(s) failed"));
        assert!(message.contains("put_inline_policy 'p1'"));
        assert!(message.contains("attach_managed_policy 'ReadOnly'"));
    }
}
