use rolesync_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Path used when a role spec does not name one.
pub const DEFAULT_ROLE_PATH: &str = "/";

/// Session duration used when a role spec does not name one.
pub const DEFAULT_MAX_SESSION_DURATION_SECONDS: u32 = 3600;

/// Largest session duration the remote service accepts.
pub const MAX_SESSION_DURATION_UPPER_BOUND_SECONDS: u32 = 43_200;

const ROLE_NAME_MAX_LENGTH: usize = 64;

/// Role name, the only key correlating desired and remote state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleName(NonEmptyString);

impl RoleName {
    /// Creates a validated role name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value)?;
        let raw = value.as_str();

        if raw.len() > ROLE_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "role name '{raw}' exceeds {ROLE_NAME_MAX_LENGTH} characters"
            )));
        }

        if let Some(invalid) = raw
            .chars()
            .find(|character| !is_role_name_character(*character))
        {
            return Err(AppError::Validation(format!(
                "role name '{raw}' contains invalid character '{invalid}'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the role name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn is_role_name_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || "+=,.@_-".contains(character)
}

/// Permission document embedded directly in a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinePolicy {
    /// Policy name, unique per role.
    pub name: String,
    /// Opaque policy document body.
    pub document: String,
}

impl InlinePolicy {
    /// Creates an inline policy pair.
    #[must_use]
    pub fn new(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
        }
    }
}

/// Desired state of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    name: RoleName,
    description: Option<String>,
    path: String,
    max_session_duration: u32,
    trust_relationship: NonEmptyString,
    inline_policies: Vec<InlinePolicy>,
    managed_policy_references: Vec<String>,
}

/// Input payload used to construct a validated role spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpecInput {
    /// Role name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional hierarchical path, defaults to `/`.
    #[serde(default)]
    pub path: Option<String>,
    /// Optional session duration in seconds, defaults to one hour.
    #[serde(default)]
    pub max_session_duration: Option<u32>,
    /// Opaque trust policy document.
    pub trust_relationship: String,
    /// Ordered inline policies.
    #[serde(default)]
    pub inline_policies: Vec<InlinePolicy>,
    /// Managed policy ARNs or short names.
    #[serde(default)]
    pub managed_policy_references: Vec<String>,
}

impl RoleSpec {
    /// Creates a validated role spec.
    pub fn new(input: RoleSpecInput) -> AppResult<Self> {
        let RoleSpecInput {
            name,
            description,
            path,
            max_session_duration,
            trust_relationship,
            inline_policies,
            managed_policy_references,
        } = input;

        let name = RoleName::new(name)?;

        let path = path
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_PATH.to_owned());
        if !path.starts_with('/') || !path.ends_with('/') {
            return Err(AppError::Validation(format!(
                "role '{name}' path '{path}' must begin and end with '/'"
            )));
        }

        let max_session_duration =
            max_session_duration.unwrap_or(DEFAULT_MAX_SESSION_DURATION_SECONDS);
        if !(DEFAULT_MAX_SESSION_DURATION_SECONDS..=MAX_SESSION_DURATION_UPPER_BOUND_SECONDS)
            .contains(&max_session_duration)
        {
            return Err(AppError::Validation(format!(
                "role '{name}' max session duration {max_session_duration} must be between \
                 {DEFAULT_MAX_SESSION_DURATION_SECONDS} and \
                 {MAX_SESSION_DURATION_UPPER_BOUND_SECONDS} seconds"
            )));
        }

        let trust_relationship = NonEmptyString::new(trust_relationship).map_err(|_| {
            AppError::Validation(format!("role '{name}' requires a trust relationship"))
        })?;

        Ok(Self {
            description: description.filter(|value| !value.is_empty()),
            path,
            max_session_duration,
            trust_relationship,
            inline_policies: dedupe_inline_policies(&name, inline_policies)?,
            managed_policy_references: dedupe_references(managed_policy_references),
            name,
        })
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &RoleName {
        &self.name
    }

    /// Returns the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the role path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the maximum session duration in seconds.
    #[must_use]
    pub fn max_session_duration(&self) -> u32 {
        self.max_session_duration
    }

    /// Returns the opaque trust policy document.
    #[must_use]
    pub fn trust_relationship(&self) -> &str {
        self.trust_relationship.as_str()
    }

    /// Returns inline policies in declaration order.
    #[must_use]
    pub fn inline_policies(&self) -> &[InlinePolicy] {
        &self.inline_policies
    }

    /// Returns managed policy references in declaration order.
    #[must_use]
    pub fn managed_policy_references(&self) -> &[String] {
        &self.managed_policy_references
    }

    /// Returns whether an inline policy with this name is desired.
    #[must_use]
    pub fn declares_inline_policy(&self, policy_name: &str) -> bool {
        self.inline_policies
            .iter()
            .any(|policy| policy.name == policy_name)
    }
}

// Last body for a repeated name wins, kept at the first occurrence's position.
fn dedupe_inline_policies(
    role_name: &RoleName,
    inline_policies: Vec<InlinePolicy>,
) -> AppResult<Vec<InlinePolicy>> {
    let mut deduped: Vec<InlinePolicy> = Vec::with_capacity(inline_policies.len());

    for policy in inline_policies {
        if policy.name.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "role '{role_name}' has an inline policy without a name"
            )));
        }

        match deduped
            .iter_mut()
            .find(|existing| existing.name == policy.name)
        {
            Some(existing) => existing.document = policy.document,
            None => deduped.push(policy),
        }
    }

    Ok(deduped)
}

fn dedupe_references(references: Vec<String>) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::with_capacity(references.len());
    for reference in references {
        let reference = reference.trim().to_owned();
        if !reference.is_empty() && !deduped.contains(&reference) {
            deduped.push(reference);
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::{InlinePolicy, RoleName, RoleSpec, RoleSpecInput};

    fn input() -> RoleSpecInput {
        RoleSpecInput {
            name: "sample-role".to_owned(),
            trust_relationship: r#"{"Version":"2012-10-17"}"#.to_owned(),
            ..RoleSpecInput::default()
        }
    }

    #[test]
    fn role_spec_applies_defaults() {
        let spec = RoleSpec::new(input());
        assert!(spec.is_ok());
        let spec = spec.unwrap_or_else(|_| unreachable!());

        assert_eq!(spec.path(), "/");
        assert_eq!(spec.max_session_duration(), 3600);
        assert_eq!(spec.description(), None);
    }

    #[test]
    fn role_spec_treats_empty_description_as_absent() {
        let spec = RoleSpec::new(RoleSpecInput {
            description: Some(String::new()),
            ..input()
        });
        assert!(spec.is_ok());
        assert_eq!(spec.unwrap_or_else(|_| unreachable!()).description(), None);
    }

    #[test]
    fn role_spec_rejects_missing_trust_relationship() {
        let spec = RoleSpec::new(RoleSpecInput {
            trust_relationship: "  ".to_owned(),
            ..input()
        });
        assert!(spec.is_err());
    }

    #[test]
    fn role_spec_rejects_out_of_range_session_duration() {
        for duration in [0, 3599, 43_201] {
            let spec = RoleSpec::new(RoleSpecInput {
                max_session_duration: Some(duration),
                ..input()
            });
            assert!(spec.is_err(), "duration {duration} should be rejected");
        }
    }

    #[test]
    fn role_spec_rejects_unterminated_path() {
        let spec = RoleSpec::new(RoleSpecInput {
            path: Some("/service".to_owned()),
            ..input()
        });
        assert!(spec.is_err());
    }

    #[test]
    fn repeated_inline_policy_name_keeps_last_document() {
        let spec = RoleSpec::new(RoleSpecInput {
            inline_policies: vec![
                InlinePolicy::new("p1", "first"),
                InlinePolicy::new("p2", "other"),
                InlinePolicy::new("p1", "second"),
            ],
            ..input()
        });
        assert!(spec.is_ok());
        let spec = spec.unwrap_or_else(|_| unreachable!());

        assert_eq!(
            spec.inline_policies(),
            &[
                InlinePolicy::new("p1", "second"),
                InlinePolicy::new("p2", "other"),
            ]
        );
    }

    #[test]
    fn managed_policy_references_are_trimmed_and_deduplicated() {
        let spec = RoleSpec::new(RoleSpecInput {
            managed_policy_references: vec![
                " ReadOnlyAccess".to_owned(),
                "ReadOnlyAccess".to_owned(),
                String::new(),
            ],
            ..input()
        });
        assert!(spec.is_ok());
        assert_eq!(
            spec.unwrap_or_else(|_| unreachable!())
                .managed_policy_references(),
            &["ReadOnlyAccess".to_owned()]
        );
    }

    #[test]
    fn role_name_rejects_invalid_characters() {
        assert!(RoleName::new("team/role").is_err());
        assert!(RoleName::new("a".repeat(65)).is_err());
        assert!(RoleName::new("svc+deploy@prod").is_ok());
    }
}
