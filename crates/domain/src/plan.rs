use crate::{AttachedPolicy, InlinePolicy, RemoteRoleState, RoleName, RoleSpec};

/// Mutation category, used to label applied operations and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationCategory {
    /// Role creation.
    CreateRole,
    /// Scalar role attribute update.
    UpdateRole,
    /// Inline policy upsert.
    PutInlinePolicy,
    /// Inline policy removal.
    DeleteInlinePolicy,
    /// Managed policy attachment.
    AttachManagedPolicy,
    /// Managed policy detachment.
    DetachManagedPolicy,
    /// Role removal.
    DeleteRole,
}

impl MutationCategory {
    /// Returns stable operation label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRole => "create_role",
            Self::UpdateRole => "update_role",
            Self::PutInlinePolicy => "put_inline_policy",
            Self::DeleteInlinePolicy => "delete_inline_policy",
            Self::AttachManagedPolicy => "attach_managed_policy",
            Self::DetachManagedPolicy => "detach_managed_policy",
            Self::DeleteRole => "delete_role",
        }
    }
}

/// One scalar attribute that differs from the remote value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Replace the description; `None` clears it.
    Description(Option<String>),
    /// Replace the maximum session duration.
    MaxSessionDuration(u32),
    /// Replace the trust policy document.
    TrustRelationship(String),
}

impl FieldUpdate {
    /// Returns stable field label.
    #[must_use]
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Description(_) => "description",
            Self::MaxSessionDuration(_) => "max_session_duration",
            Self::TrustRelationship(_) => "trust_relationship",
        }
    }
}

/// Attributes sent when a role is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCreation {
    /// Role path.
    pub path: String,
    /// Optional description.
    pub description: Option<String>,
    /// Maximum session duration in seconds.
    pub max_session_duration: u32,
    /// Trust policy document.
    pub trust_relationship: String,
}

/// Ordered set of remote mutations for one role.
///
/// Categories run in field order: creation, field updates, inline puts,
/// inline deletes, attachments, detachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    /// Role the plan targets.
    pub role_name: RoleName,
    /// Role creation, present only on the create path.
    pub create_role: Option<RoleCreation>,
    /// Scalar attribute updates.
    pub field_updates: Vec<FieldUpdate>,
    /// Inline policies to upsert.
    pub inline_policy_puts: Vec<InlinePolicy>,
    /// Inline policy names to delete.
    pub inline_policy_deletes: Vec<String>,
    /// Managed policy references to attach, resolved when applied.
    pub policy_attachments: Vec<String>,
    /// Attached managed policies to detach.
    pub policy_detachments: Vec<AttachedPolicy>,
}

impl MutationPlan {
    /// Returns whether the plan holds nothing beyond idempotent upserts.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.drift_count() == 0
    }

    /// Counts the non-idempotent changes: creation, updates, deletions and detachments.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        usize::from(self.create_role.is_some())
            + self.field_updates.len()
            + self.inline_policy_deletes.len()
            + self.policy_detachments.len()
    }
}

/// Plans the full creation of a role that does not exist remotely.
#[must_use]
pub fn plan_role_creation(spec: &RoleSpec) -> MutationPlan {
    MutationPlan {
        role_name: spec.name().clone(),
        create_role: Some(RoleCreation {
            path: spec.path().to_owned(),
            description: spec.description().map(ToOwned::to_owned),
            max_session_duration: spec.max_session_duration(),
            trust_relationship: spec.trust_relationship().to_owned(),
        }),
        field_updates: Vec::new(),
        inline_policy_puts: spec.inline_policies().to_vec(),
        inline_policy_deletes: Vec::new(),
        policy_attachments: spec.managed_policy_references().to_vec(),
        policy_detachments: Vec::new(),
    }
}

/// Plans the mutations that converge an existing remote role onto its spec.
///
/// Documents are compared byte for byte; formatting-only differences count as drift.
#[must_use]
pub fn plan_role_convergence(spec: &RoleSpec, remote: &RemoteRoleState) -> MutationPlan {
    let mut field_updates = Vec::new();

    if spec.description() != remote.role.description.as_deref() {
        field_updates.push(FieldUpdate::Description(
            spec.description().map(ToOwned::to_owned),
        ));
    }

    if spec.max_session_duration() != remote.role.max_session_duration {
        field_updates.push(FieldUpdate::MaxSessionDuration(
            spec.max_session_duration(),
        ));
    }

    if spec.trust_relationship() != remote.role.trust_relationship {
        field_updates.push(FieldUpdate::TrustRelationship(
            spec.trust_relationship().to_owned(),
        ));
    }

    let inline_policy_deletes = remote
        .inline_policy_names
        .iter()
        .filter(|name| !spec.declares_inline_policy(name))
        .cloned()
        .collect();

    let references = spec.managed_policy_references();
    let policy_detachments = remote
        .attached_policies
        .iter()
        .filter(|attached| {
            !references
                .iter()
                .any(|reference| attached.matches_reference(reference))
        })
        .cloned()
        .collect();

    MutationPlan {
        role_name: spec.name().clone(),
        create_role: None,
        field_updates,
        inline_policy_puts: spec.inline_policies().to_vec(),
        inline_policy_deletes,
        policy_attachments: references.to_vec(),
        policy_detachments,
    }
}
