use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::AttachedPolicy;

/// Remote-assigned identifiers written back after a role is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    /// Canonical role identifier.
    pub arn: String,
    /// Stable opaque role id.
    pub role_id: String,
}

/// Role attributes returned by a single describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRole {
    /// Canonical role identifier.
    pub arn: String,
    /// Stable opaque role id.
    pub role_id: String,
    /// Description, absent when the remote value is empty.
    pub description: Option<String>,
    /// Maximum session duration in seconds.
    pub max_session_duration: u32,
    /// Trust policy document as stored remotely.
    pub trust_relationship: String,
}

impl RemoteRole {
    /// Returns the identifiers recorded in role status.
    #[must_use]
    pub fn status(&self) -> RoleStatus {
        RoleStatus {
            arn: self.arn.clone(),
            role_id: self.role_id.clone(),
        }
    }
}

/// Full remote state of one role, including its policy sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoleState {
    /// Role attributes.
    pub role: RemoteRole,
    /// Names of inline policies embedded in the role.
    pub inline_policy_names: BTreeSet<String>,
    /// Managed policies attached to the role.
    pub attached_policies: BTreeSet<AttachedPolicy>,
}
