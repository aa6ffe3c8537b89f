use crate::AppError;

/// One failed item inside a batch of remote mutations.
#[derive(Debug)]
pub struct ItemFailure {
    /// Stable operation label such as `detach_managed_policy`.
    pub operation: String,
    /// Policy name, policy reference or role the operation targeted.
    pub target: String,
    /// Underlying failure.
    pub cause: AppError,
}

impl ItemFailure {
    /// Creates a failure record for one batch item.
    #[must_use]
    pub fn new(operation: impl Into<String>, target: impl Into<String>, cause: AppError) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            cause,
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} '{}': {}",
            self.operation, self.target, self.cause
        )
    }
}

/// Joins failure records into one human-readable line.
#[must_use]
pub fn format_item_failures(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
