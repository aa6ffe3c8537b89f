use async_trait::async_trait;
use rolesync_core::AppResult;
use rolesync_domain::{RoleName, RoleSpec, RoleStatus};

/// Desired-state document: the spec plus identifiers observed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpecDocument {
    /// Desired role state.
    pub spec: RoleSpec,
    /// Identifiers written back after creation.
    pub status: Option<RoleStatus>,
}

/// Port for the desired-state store.
#[async_trait]
pub trait RoleSpecRepository: Send + Sync {
    /// Finds the document for one role, `None` once it has been deleted.
    async fn find_role_spec(&self, role_name: &RoleName) -> AppResult<Option<RoleSpecDocument>>;

    /// Writes remote identifiers back into the document.
    async fn save_role_status(&self, role_name: &RoleName, status: &RoleStatus) -> AppResult<()>;
}
