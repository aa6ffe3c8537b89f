use async_trait::async_trait;
use rolesync_core::AppResult;
use rolesync_domain::{
    AttachedPolicy, InlinePolicy, PolicyArn, RemoteRole, RoleCreation, RoleName, RoleStatus,
};

/// One page of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage<T> {
    /// Items on this page, in remote order.
    pub items: Vec<T>,
    /// Whether more items follow this page.
    pub is_truncated: bool,
    /// Continuation marker for the next page.
    pub marker: Option<String>,
}

impl<T> ListPage<T> {
    /// Creates the last page of a listing.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            is_truncated: false,
            marker: None,
        }
    }

    /// Creates a truncated page pointing at the next one.
    #[must_use]
    pub fn truncated(items: Vec<T>, marker: impl Into<String>) -> Self {
        Self {
            items,
            is_truncated: true,
            marker: Some(marker.into()),
        }
    }
}

/// Port for the remote IAM service.
///
/// Every call is keyed by role name. Absent roles and policies surface as
/// `AppError::NotFound`; other failures as transient or permanent remote errors.
#[async_trait]
pub trait IamRoleGateway: Send + Sync {
    /// Creates a role and returns its remote identifiers.
    async fn create_role(
        &self,
        role_name: &RoleName,
        creation: &RoleCreation,
    ) -> AppResult<RoleStatus>;

    /// Describes a role.
    async fn get_role(&self, role_name: &RoleName) -> AppResult<RemoteRole>;

    /// Replaces the role description; `None` clears it.
    async fn update_role_description(
        &self,
        role_name: &RoleName,
        description: Option<&str>,
    ) -> AppResult<()>;

    /// Replaces the maximum session duration.
    async fn update_role_max_session_duration(
        &self,
        role_name: &RoleName,
        max_session_duration: u32,
    ) -> AppResult<()>;

    /// Replaces the trust policy document.
    async fn update_assume_role_policy(
        &self,
        role_name: &RoleName,
        document: &str,
    ) -> AppResult<()>;

    /// Deletes a role that has no remaining policies.
    async fn delete_role(&self, role_name: &RoleName) -> AppResult<()>;

    /// Upserts one inline policy.
    async fn put_role_policy(&self, role_name: &RoleName, policy: &InlinePolicy)
    -> AppResult<()>;

    /// Lists one page of inline policy names.
    async fn list_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<String>>;

    /// Deletes one inline policy.
    async fn delete_role_policy(&self, role_name: &RoleName, policy_name: &str) -> AppResult<()>;

    /// Attaches one managed policy.
    async fn attach_role_policy(&self, role_name: &RoleName, policy_arn: &PolicyArn)
    -> AppResult<()>;

    /// Lists one page of attached managed policies.
    async fn list_attached_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<AttachedPolicy>>;

    /// Detaches one managed policy.
    async fn detach_role_policy(&self, role_name: &RoleName, policy_arn: &str) -> AppResult<()>;
}
