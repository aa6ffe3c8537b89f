use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{AttachedPolicy, RemoteRoleState, RoleName};

use crate::reconcile_ports::{IamRoleGateway, ListPage};

/// Reads the live state of a role, following truncated listings to the end.
#[derive(Clone)]
pub struct RemoteStateReader {
    gateway: Arc<dyn IamRoleGateway>,
}

impl RemoteStateReader {
    /// Creates a reader over the remote IAM gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn IamRoleGateway>) -> Self {
        Self { gateway }
    }

    /// Returns whether the role exists remotely.
    ///
    /// Only a not-found answer means absence; other failures are returned.
    pub async fn exists(&self, role_name: &RoleName) -> AppResult<bool> {
        match self.gateway.get_role(role_name).await {
            Ok(_) => Ok(true),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Describes the role together with its inline and attached policy sets.
    pub async fn describe(&self, role_name: &RoleName) -> AppResult<RemoteRoleState> {
        let role = self.gateway.get_role(role_name).await?;
        let inline_policy_names = self.list_inline_policy_names(role_name).await?;
        let attached_policies = self.list_attached_policies(role_name).await?;

        Ok(RemoteRoleState {
            role,
            inline_policy_names,
            attached_policies,
        })
    }

    /// Lists every inline policy name embedded in the role.
    pub async fn list_inline_policy_names(
        &self,
        role_name: &RoleName,
    ) -> AppResult<BTreeSet<String>> {
        let gateway = &self.gateway;
        let names = collect_pages(role_name, "inline policies", move |marker| async move {
            gateway.list_role_policies(role_name, marker.as_deref()).await
        })
        .await?;

        Ok(names.into_iter().collect())
    }

    /// Lists every managed policy attached to the role.
    pub async fn list_attached_policies(
        &self,
        role_name: &RoleName,
    ) -> AppResult<BTreeSet<AttachedPolicy>> {
        let gateway = &self.gateway;
        let attached = collect_pages(role_name, "attached policies", move |marker| async move {
            gateway
                .list_attached_role_policies(role_name, marker.as_deref())
                .await
        })
        .await?;

        Ok(attached.into_iter().collect())
    }
}

/// Drains a paginated listing in page order.
///
/// The first request carries no marker; later requests carry the previous
/// page's marker, which must be non-empty because the service rejects an
/// explicit empty marker.
pub(crate) async fn collect_pages<T, F, Fut>(
    role_name: &RoleName,
    listing: &str,
    mut fetch_page: F,
) -> AppResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = AppResult<ListPage<T>>>,
{
    let mut items = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let page = fetch_page(marker.take()).await?;
        items.extend(page.items);

        if !page.is_truncated {
            return Ok(items);
        }

        match page.marker.filter(|value| !value.is_empty()) {
            Some(next) => marker = Some(next),
            None => {
                return Err(AppError::PermanentRemote(format!(
                    "listing {listing} of role '{role_name}' was truncated without a continuation marker"
                )));
            }
        }
    }
}
