use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use rolesync_application::{CallerIdentityProvider, IamRoleGateway, ListPage};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{
    AttachedPolicy, InlinePolicy, PolicyArn, RemoteRole, RemoteRoleState, RoleCreation, RoleName,
    RoleStatus,
};
use tokio::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 100;
const MARKER_PREFIX: &str = "page-";

#[derive(Debug, Clone)]
struct StoredRole {
    role: RemoteRole,
    inline_policies: BTreeMap<String, String>,
    attached_policies: BTreeSet<AttachedPolicy>,
}

#[derive(Debug, Default)]
struct IamState {
    roles: BTreeMap<String, StoredRole>,
    failures: HashSet<(String, String)>,
    next_role_id: u64,
}

impl IamState {
    fn check(&self, operation: &str, target: &str) -> AppResult<()> {
        if self
            .failures
            .contains(&(operation.to_owned(), target.to_owned()))
        {
            return Err(AppError::TransientRemote(format!(
                "simulated {operation} failure for '{target}'"
            )));
        }

        Ok(())
    }

    fn role(&self, role_name: &RoleName) -> AppResult<&StoredRole> {
        self.roles
            .get(role_name.as_str())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' does not exist")))
    }

    fn role_mut(&mut self, role_name: &RoleName) -> AppResult<&mut StoredRole> {
        self.roles
            .get_mut(role_name.as_str())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' does not exist")))
    }
}

/// In-memory IAM and caller identity service.
///
/// Listings are paginated with a configurable page size, and any operation
/// can be made to fail for one target to exercise partial-failure paths.
#[derive(Debug)]
pub struct InMemoryIamService {
    account_id: String,
    page_size: usize,
    state: RwLock<IamState>,
}

impl InMemoryIamService {
    /// Creates an empty service owned by `account_id`.
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
            state: RwLock::new(IamState::default()),
        }
    }

    /// Sets how many items each listing page holds.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes `operation` fail transiently for `target` until failures are cleared.
    ///
    /// Targets are the role name for role calls, the policy name for inline
    /// policy calls and the policy ARN for attach and detach.
    pub async fn fail_operation(&self, operation: &str, target: &str) {
        self.state
            .write()
            .await
            .failures
            .insert((operation.to_owned(), target.to_owned()));
    }

    /// Removes every injected failure.
    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    /// Returns the full stored state of a role.
    pub async fn role_state(&self, role_name: &RoleName) -> Option<RemoteRoleState> {
        self.state
            .read()
            .await
            .roles
            .get(role_name.as_str())
            .map(|stored| RemoteRoleState {
                role: stored.role.clone(),
                inline_policy_names: stored.inline_policies.keys().cloned().collect(),
                attached_policies: stored.attached_policies.clone(),
            })
    }

    fn page<T: Clone>(&self, items: &[T], marker: Option<&str>) -> AppResult<ListPage<T>> {
        let offset = match marker {
            None => 0,
            Some(value) => value
                .strip_prefix(MARKER_PREFIX)
                .and_then(|offset| offset.parse::<usize>().ok())
                .filter(|offset| *offset <= items.len())
                .ok_or_else(|| {
                    AppError::PermanentRemote(format!("invalid pagination marker '{value}'"))
                })?,
        };

        let end = offset.saturating_add(self.page_size).min(items.len());
        let page_items = items[offset..end].to_vec();

        if end < items.len() {
            Ok(ListPage::truncated(page_items, format!("{MARKER_PREFIX}{end}")))
        } else {
            Ok(ListPage::last(page_items))
        }
    }
}

#[async_trait]
impl IamRoleGateway for InMemoryIamService {
    async fn create_role(
        &self,
        role_name: &RoleName,
        creation: &RoleCreation,
    ) -> AppResult<RoleStatus> {
        let mut state = self.state.write().await;
        state.check("create_role", role_name.as_str())?;

        if state.roles.contains_key(role_name.as_str()) {
            return Err(AppError::PermanentRemote(format!(
                "role '{role_name}' already exists"
            )));
        }

        state.next_role_id += 1;
        let role = RemoteRole {
            arn: format!(
                "arn:aws:iam::{}:role{}{role_name}",
                self.account_id, creation.path
            ),
            role_id: format!("AROA{:016X}", state.next_role_id),
            description: creation.description.clone(),
            max_session_duration: creation.max_session_duration,
            trust_relationship: creation.trust_relationship.clone(),
        };
        let status = role.status();

        state.roles.insert(
            role_name.as_str().to_owned(),
            StoredRole {
                role,
                inline_policies: BTreeMap::new(),
                attached_policies: BTreeSet::new(),
            },
        );

        Ok(status)
    }

    async fn get_role(&self, role_name: &RoleName) -> AppResult<RemoteRole> {
        let state = self.state.read().await;
        state.check("get_role", role_name.as_str())?;
        Ok(state.role(role_name)?.role.clone())
    }

    async fn update_role_description(
        &self,
        role_name: &RoleName,
        description: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("update_role_description", role_name.as_str())?;
        state.role_mut(role_name)?.role.description = description
            .filter(|description| !description.is_empty())
            .map(ToOwned::to_owned);
        Ok(())
    }

    async fn update_role_max_session_duration(
        &self,
        role_name: &RoleName,
        max_session_duration: u32,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("update_role_max_session_duration", role_name.as_str())?;
        state.role_mut(role_name)?.role.max_session_duration = max_session_duration;
        Ok(())
    }

    async fn update_assume_role_policy(
        &self,
        role_name: &RoleName,
        document: &str,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("update_assume_role_policy", role_name.as_str())?;
        state.role_mut(role_name)?.role.trust_relationship = document.to_owned();
        Ok(())
    }

    async fn delete_role(&self, role_name: &RoleName) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("delete_role", role_name.as_str())?;

        let stored = state.role(role_name)?;
        if !stored.inline_policies.is_empty() || !stored.attached_policies.is_empty() {
            return Err(AppError::PermanentRemote(format!(
                "role '{role_name}' cannot be deleted while policies remain"
            )));
        }

        state.roles.remove(role_name.as_str());
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &RoleName,
        policy: &InlinePolicy,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("put_role_policy", policy.name.as_str())?;
        state
            .role_mut(role_name)?
            .inline_policies
            .insert(policy.name.clone(), policy.document.clone());
        Ok(())
    }

    async fn list_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<String>> {
        let state = self.state.read().await;
        state.check("list_role_policies", role_name.as_str())?;
        let names: Vec<String> = state.role(role_name)?.inline_policies.keys().cloned().collect();
        self.page(&names, marker)
    }

    async fn delete_role_policy(&self, role_name: &RoleName, policy_name: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("delete_role_policy", policy_name)?;

        if state
            .role_mut(role_name)?
            .inline_policies
            .remove(policy_name)
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "inline policy '{policy_name}' does not exist on role '{role_name}'"
            )));
        }

        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &RoleName,
        policy_arn: &PolicyArn,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("attach_role_policy", policy_arn.as_str())?;
        state
            .role_mut(role_name)?
            .attached_policies
            .insert(AttachedPolicy::new(
                policy_arn.as_str(),
                policy_arn.policy_name(),
            ));
        Ok(())
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<AttachedPolicy>> {
        let state = self.state.read().await;
        state.check("list_attached_role_policies", role_name.as_str())?;
        let attached: Vec<AttachedPolicy> = state
            .role(role_name)?
            .attached_policies
            .iter()
            .cloned()
            .collect();
        self.page(&attached, marker)
    }

    async fn detach_role_policy(&self, role_name: &RoleName, policy_arn: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.check("detach_role_policy", policy_arn)?;

        let stored = state.role_mut(role_name)?;
        let before = stored.attached_policies.len();
        stored
            .attached_policies
            .retain(|attached| attached.arn != policy_arn);

        if stored.attached_policies.len() == before {
            return Err(AppError::NotFound(format!(
                "policy '{policy_arn}' is not attached to role '{role_name}'"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl CallerIdentityProvider for InMemoryIamService {
    async fn caller_account_id(&self) -> AppResult<String> {
        self.state
            .read()
            .await
            .check("get_caller_identity", self.account_id.as_str())?;
        Ok(self.account_id.clone())
    }
}
