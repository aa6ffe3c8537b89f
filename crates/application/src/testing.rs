//! In-process fakes shared by the service tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{
    AttachedPolicy, InlinePolicy, PolicyArn, RemoteRole, RoleCreation, RoleName, RoleSpec,
    RoleSpecInput, RoleStatus,
};
use tokio::sync::Mutex;

use crate::reconcile_ports::{
    CallerIdentityProvider, IamRoleGateway, ListPage, ReconcileEvent, ReconcileEventSink,
    RoleSpecDocument, RoleSpecRepository,
};

pub(crate) const ACCOUNT_ID: &str = "123456789012";

pub(crate) fn role_name(value: &str) -> RoleName {
    RoleName::new(value).unwrap_or_else(|error| panic!("invalid test role name: {error}"))
}

pub(crate) fn role_spec(input: RoleSpecInput) -> RoleSpec {
    RoleSpec::new(input).unwrap_or_else(|error| panic!("invalid test role spec: {error}"))
}

pub(crate) fn sample_spec_input() -> RoleSpecInput {
    RoleSpecInput {
        name: "sample-role".to_owned(),
        description: None,
        path: None,
        max_session_duration: Some(3600),
        trust_relationship: "T1".to_owned(),
        inline_policies: vec![InlinePolicy::new("p1", "D1")],
        managed_policy_references: vec!["AdministratorAccess".to_owned()],
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeRole {
    pub(crate) role: RemoteRole,
    pub(crate) inline_policies: BTreeMap<String, String>,
    pub(crate) attached_policies: BTreeSet<AttachedPolicy>,
}

#[derive(Default)]
pub(crate) struct FakeIamState {
    pub(crate) roles: BTreeMap<String, FakeRole>,
    pub(crate) page_size: usize,
    pub(crate) failures: HashSet<(String, String)>,
    pub(crate) identity_fails: bool,
    pub(crate) identity_calls: usize,
    pub(crate) calls: Vec<String>,
    pub(crate) list_markers: Vec<Option<String>>,
    pub(crate) effective_mutations: usize,
    next_role_id: usize,
}

/// Fake remote IAM and identity service.
pub(crate) struct FakeIamService {
    pub(crate) state: Mutex<FakeIamState>,
}

impl Default for FakeIamService {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeIamState {
                page_size: 2,
                ..FakeIamState::default()
            }),
        }
    }
}

impl FakeIamService {
    pub(crate) async fn fail_on(&self, operation: &str, target: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert((operation.to_owned(), target.to_owned()));
    }

    pub(crate) async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        max_session_duration: u32,
        trust_relationship: &str,
        inline_policies: &[(&str, &str)],
        attached_policies: &[AttachedPolicy],
    ) {
        self.state.lock().await.roles.insert(
            name.to_owned(),
            FakeRole {
                role: RemoteRole {
                    arn: format!("arn:aws:iam::{ACCOUNT_ID}:role/{name}"),
                    role_id: format!("AROA{}", name.to_uppercase()),
                    description: description.map(ToOwned::to_owned),
                    max_session_duration,
                    trust_relationship: trust_relationship.to_owned(),
                },
                inline_policies: inline_policies
                    .iter()
                    .map(|(policy, document)| ((*policy).to_owned(), (*document).to_owned()))
                    .collect(),
                attached_policies: attached_policies.iter().cloned().collect(),
            },
        );
    }

    pub(crate) async fn role(&self, name: &str) -> Option<FakeRole> {
        self.state.lock().await.roles.get(name).cloned()
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub(crate) async fn clear_calls(&self) {
        let mut state = self.state.lock().await;
        state.calls.clear();
        state.list_markers.clear();
        state.effective_mutations = 0;
    }
}

impl FakeIamState {
    fn call(&mut self, operation: &str, target: &str) -> AppResult<()> {
        self.calls.push(format!("{operation}:{target}"));
        if self
            .failures
            .contains(&(operation.to_owned(), target.to_owned()))
        {
            return Err(AppError::TransientRemote(format!(
                "injected {operation} failure for '{target}'"
            )));
        }
        Ok(())
    }

    fn role_mut(&mut self, role_name: &RoleName) -> AppResult<&mut FakeRole> {
        self.roles
            .get_mut(role_name.as_str())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_name}' does not exist")))
    }

    fn page<T: Clone>(&mut self, items: &[T], marker: Option<&str>) -> AppResult<ListPage<T>> {
        self.list_markers.push(marker.map(ToOwned::to_owned));
        let offset = match marker {
            None => 0,
            Some(value) => value
                .strip_prefix("offset-")
                .and_then(|offset| offset.parse::<usize>().ok())
                .ok_or_else(|| AppError::PermanentRemote(format!("invalid marker '{value}'")))?,
        };

        let end = (offset + self.page_size.max(1)).min(items.len());
        let page_items = items.get(offset..end).unwrap_or_default().to_vec();
        if end < items.len() {
            Ok(ListPage::truncated(page_items, format!("offset-{end}")))
        } else {
            Ok(ListPage::last(page_items))
        }
    }
}

#[async_trait]
impl IamRoleGateway for FakeIamService {
    async fn create_role(
        &self,
        role_name: &RoleName,
        creation: &RoleCreation,
    ) -> AppResult<RoleStatus> {
        let mut state = self.state.lock().await;
        state.call("create_role", role_name.as_str())?;
        if state.roles.contains_key(role_name.as_str()) {
            return Err(AppError::PermanentRemote(format!(
                "role '{role_name}' already exists"
            )));
        }

        state.next_role_id += 1;
        let role = RemoteRole {
            arn: format!(
                "arn:aws:iam::{ACCOUNT_ID}:role{}{}",
                creation.path, role_name
            ),
            role_id: format!("AROA{:08}", state.next_role_id),
            description: creation.description.clone(),
            max_session_duration: creation.max_session_duration,
            trust_relationship: creation.trust_relationship.clone(),
        };
        let status = role.status();
        state.roles.insert(
            role_name.as_str().to_owned(),
            FakeRole {
                role,
                inline_policies: BTreeMap::new(),
                attached_policies: BTreeSet::new(),
            },
        );
        state.effective_mutations += 1;
        Ok(status)
    }

    async fn get_role(&self, role_name: &RoleName) -> AppResult<RemoteRole> {
        let mut state = self.state.lock().await;
        state.call("get_role", role_name.as_str())?;
        Ok(state.role_mut(role_name)?.role.clone())
    }

    async fn update_role_description(
        &self,
        role_name: &RoleName,
        description: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("update_role_description", role_name.as_str())?;
        state.role_mut(role_name)?.role.description = description.map(ToOwned::to_owned);
        state.effective_mutations += 1;
        Ok(())
    }

    async fn update_role_max_session_duration(
        &self,
        role_name: &RoleName,
        max_session_duration: u32,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("update_role_max_session_duration", role_name.as_str())?;
        state.role_mut(role_name)?.role.max_session_duration = max_session_duration;
        state.effective_mutations += 1;
        Ok(())
    }

    async fn update_assume_role_policy(
        &self,
        role_name: &RoleName,
        document: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("update_assume_role_policy", role_name.as_str())?;
        state.role_mut(role_name)?.role.trust_relationship = document.to_owned();
        state.effective_mutations += 1;
        Ok(())
    }

    async fn delete_role(&self, role_name: &RoleName) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("delete_role", role_name.as_str())?;
        let role = state.role_mut(role_name)?;
        if !role.inline_policies.is_empty() || !role.attached_policies.is_empty() {
            return Err(AppError::PermanentRemote(format!(
                "role '{role_name}' still has policies"
            )));
        }
        state.roles.remove(role_name.as_str());
        state.effective_mutations += 1;
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &RoleName,
        policy: &InlinePolicy,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("put_role_policy", policy.name.as_str())?;
        let previous = state
            .role_mut(role_name)?
            .inline_policies
            .insert(policy.name.clone(), policy.document.clone());
        if previous.as_deref() != Some(policy.document.as_str()) {
            state.effective_mutations += 1;
        }
        Ok(())
    }

    async fn list_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<String>> {
        let mut state = self.state.lock().await;
        state.call("list_role_policies", role_name.as_str())?;
        let names: Vec<String> = state
            .role_mut(role_name)?
            .inline_policies
            .keys()
            .cloned()
            .collect();
        state.page(&names, marker)
    }

    async fn delete_role_policy(&self, role_name: &RoleName, policy_name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("delete_role_policy", policy_name)?;
        if state
            .role_mut(role_name)?
            .inline_policies
            .remove(policy_name)
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "inline policy '{policy_name}' does not exist"
            )));
        }
        state.effective_mutations += 1;
        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &RoleName,
        policy_arn: &PolicyArn,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("attach_role_policy", policy_arn.as_str())?;
        let inserted = state
            .role_mut(role_name)?
            .attached_policies
            .insert(AttachedPolicy::new(policy_arn.as_str(), policy_arn.policy_name()));
        if inserted {
            state.effective_mutations += 1;
        }
        Ok(())
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<AttachedPolicy>> {
        let mut state = self.state.lock().await;
        state.call("list_attached_role_policies", role_name.as_str())?;
        let attached: Vec<AttachedPolicy> = state
            .role_mut(role_name)?
            .attached_policies
            .iter()
            .cloned()
            .collect();
        state.page(&attached, marker)
    }

    async fn detach_role_policy(&self, role_name: &RoleName, policy_arn: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.call("detach_role_policy", policy_arn)?;
        let role = state.role_mut(role_name)?;
        let before = role.attached_policies.len();
        role.attached_policies
            .retain(|attached| attached.arn != policy_arn);
        if role.attached_policies.len() == before {
            return Err(AppError::NotFound(format!(
                "policy '{policy_arn}' is not attached"
            )));
        }
        state.effective_mutations += 1;
        Ok(())
    }
}

#[async_trait]
impl CallerIdentityProvider for FakeIamService {
    async fn caller_account_id(&self) -> AppResult<String> {
        let mut state = self.state.lock().await;
        state.identity_calls += 1;
        if state.identity_fails {
            return Err(AppError::TransientRemote(
                "identity endpoint unavailable".to_owned(),
            ));
        }
        Ok(ACCOUNT_ID.to_owned())
    }
}

#[derive(Default)]
pub(crate) struct FakeRoleSpecRepository {
    pub(crate) documents: Mutex<HashMap<String, RoleSpecDocument>>,
    pub(crate) fail_status_writes: Mutex<bool>,
}

impl FakeRoleSpecRepository {
    pub(crate) async fn insert(&self, spec: RoleSpec) {
        self.documents.lock().await.insert(
            spec.name().as_str().to_owned(),
            RoleSpecDocument { spec, status: None },
        );
    }

    pub(crate) async fn status(&self, name: &str) -> Option<RoleStatus> {
        self.documents
            .lock()
            .await
            .get(name)
            .and_then(|document| document.status.clone())
    }
}

#[async_trait]
impl RoleSpecRepository for FakeRoleSpecRepository {
    async fn find_role_spec(&self, role_name: &RoleName) -> AppResult<Option<RoleSpecDocument>> {
        Ok(self.documents.lock().await.get(role_name.as_str()).cloned())
    }

    async fn save_role_status(&self, role_name: &RoleName, status: &RoleStatus) -> AppResult<()> {
        if *self.fail_status_writes.lock().await {
            return Err(AppError::Internal("status store unavailable".to_owned()));
        }

        let mut documents = self.documents.lock().await;
        let document = documents
            .get_mut(role_name.as_str())
            .ok_or_else(|| AppError::NotFound(format!("role spec '{role_name}' not found")))?;
        document.status = Some(status.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingEventSink {
    pub(crate) events: Mutex<Vec<ReconcileEvent>>,
}

#[async_trait]
impl ReconcileEventSink for RecordingEventSink {
    async fn record_event(&self, event: ReconcileEvent) {
        self.events.lock().await.push(event);
    }
}
