use std::collections::HashMap;

use async_trait::async_trait;
use rolesync_application::{RoleSpecDocument, RoleSpecRepository};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{RoleName, RoleSpec, RoleStatus};
use tokio::sync::RwLock;

/// In-memory desired-state store.
#[derive(Debug, Default)]
pub struct InMemoryRoleSpecRepository {
    documents: RwLock<HashMap<String, RoleSpecDocument>>,
}

impl InMemoryRoleSpecRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a spec; stored status is kept.
    pub async fn save_role_spec(&self, spec: RoleSpec) {
        let mut documents = self.documents.write().await;
        let key = spec.name().as_str().to_owned();
        let status = documents
            .remove(&key)
            .and_then(|document| document.status);

        documents.insert(key, RoleSpecDocument { spec, status });
    }

    /// Deletes a spec; returns whether one existed.
    pub async fn delete_role_spec(&self, role_name: &RoleName) -> bool {
        self.documents
            .write()
            .await
            .remove(role_name.as_str())
            .is_some()
    }
}

#[async_trait]
impl RoleSpecRepository for InMemoryRoleSpecRepository {
    async fn find_role_spec(&self, role_name: &RoleName) -> AppResult<Option<RoleSpecDocument>> {
        Ok(self.documents.read().await.get(role_name.as_str()).cloned())
    }

    async fn save_role_status(&self, role_name: &RoleName, status: &RoleStatus) -> AppResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(role_name.as_str()).ok_or_else(|| {
            AppError::NotFound(format!("role spec '{role_name}' does not exist"))
        })?;

        document.status = Some(status.clone());
        Ok(())
    }
}
