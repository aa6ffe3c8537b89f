use rolesync_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Marker present in every canonical managed policy identifier.
pub const CANONICAL_POLICY_MARKER: &str = "arn:aws:iam";

/// Returns whether a managed policy reference is already a canonical identifier.
#[must_use]
pub fn is_canonical_policy_reference(reference: &str) -> bool {
    reference.contains(CANONICAL_POLICY_MARKER)
}

/// Canonical identifier of a managed policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyArn(NonEmptyString);

impl PolicyArn {
    /// Parses a canonical identifier.
    pub fn parse(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value)?;
        if !is_canonical_policy_reference(value.as_str()) {
            return Err(AppError::Validation(format!(
                "'{value}' is not a canonical policy identifier"
            )));
        }

        Ok(Self(value))
    }

    /// Builds the identifier of a customer-managed policy owned by an account.
    pub fn for_account_policy(account_id: &str, policy_name: &str) -> AppResult<Self> {
        if account_id.trim().is_empty() {
            return Err(AppError::Validation(
                "account id must not be empty".to_owned(),
            ));
        }

        Self::parse(format!(
            "{CANONICAL_POLICY_MARKER}::{account_id}:policy/{policy_name}"
        ))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the trailing policy name segment.
    #[must_use]
    pub fn policy_name(&self) -> &str {
        self.as_str()
            .rsplit_once('/')
            .map_or(self.as_str(), |(_, name)| name)
    }
}

impl std::fmt::Display for PolicyArn {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Managed policy currently attached to a remote role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachedPolicy {
    /// Canonical identifier reported by the remote service.
    pub arn: String,
    /// Short policy name reported by the remote service.
    pub name: String,
}

impl AttachedPolicy {
    /// Creates an attached policy pair.
    #[must_use]
    pub fn new(arn: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            name: name.into(),
        }
    }

    /// Returns whether a desired reference names this policy by identifier or short name.
    #[must_use]
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.arn == reference || self.name == reference
    }
}
