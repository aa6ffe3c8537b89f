use async_trait::async_trait;
use aws_sdk_iam::Client;
use aws_sdk_iam::types::Role;
use percent_encoding::percent_decode_str;
use rolesync_application::{IamRoleGateway, ListPage};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{
    AttachedPolicy, InlinePolicy, PolicyArn, RemoteRole, RoleCreation, RoleName, RoleStatus,
};

use crate::aws_error::map_sdk_error;

/// IAM adapter backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsIamRoleGateway {
    client: Client,
}

impl AwsIamRoleGateway {
    /// Creates a gateway over an IAM client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IamRoleGateway for AwsIamRoleGateway {
    async fn create_role(
        &self,
        role_name: &RoleName,
        creation: &RoleCreation,
    ) -> AppResult<RoleStatus> {
        let output = self
            .client
            .create_role()
            .role_name(role_name.as_str())
            .path(creation.path.as_str())
            .set_description(creation.description.clone())
            .max_session_duration(session_duration_to_sdk(creation.max_session_duration)?)
            .assume_role_policy_document(creation.trust_relationship.as_str())
            .send()
            .await
            .map_err(|error| map_sdk_error(&format!("create role '{role_name}'"), error))?;

        let role = output.role().ok_or_else(|| {
            AppError::PermanentRemote(format!(
                "create role '{role_name}' returned no role description"
            ))
        })?;

        Ok(RoleStatus {
            arn: role.arn().to_owned(),
            role_id: role.role_id().to_owned(),
        })
    }

    async fn get_role(&self, role_name: &RoleName) -> AppResult<RemoteRole> {
        let output = self
            .client
            .get_role()
            .role_name(role_name.as_str())
            .send()
            .await
            .map_err(|error| map_sdk_error(&format!("get role '{role_name}'"), error))?;

        let role = output.role().ok_or_else(|| {
            AppError::PermanentRemote(format!("get role '{role_name}' returned no role"))
        })?;

        remote_role_from_sdk(role_name, role)
    }

    async fn update_role_description(
        &self,
        role_name: &RoleName,
        description: Option<&str>,
    ) -> AppResult<()> {
        self.client
            .update_role()
            .role_name(role_name.as_str())
            .description(description.unwrap_or_default())
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(&format!("update description of role '{role_name}'"), error)
            })?;

        Ok(())
    }

    async fn update_role_max_session_duration(
        &self,
        role_name: &RoleName,
        max_session_duration: u32,
    ) -> AppResult<()> {
        self.client
            .update_role()
            .role_name(role_name.as_str())
            .max_session_duration(session_duration_to_sdk(max_session_duration)?)
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("update max session duration of role '{role_name}'"),
                    error,
                )
            })?;

        Ok(())
    }

    async fn update_assume_role_policy(
        &self,
        role_name: &RoleName,
        document: &str,
    ) -> AppResult<()> {
        self.client
            .update_assume_role_policy()
            .role_name(role_name.as_str())
            .policy_document(document)
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(&format!("update trust policy of role '{role_name}'"), error)
            })?;

        Ok(())
    }

    async fn delete_role(&self, role_name: &RoleName) -> AppResult<()> {
        self.client
            .delete_role()
            .role_name(role_name.as_str())
            .send()
            .await
            .map_err(|error| map_sdk_error(&format!("delete role '{role_name}'"), error))?;

        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &RoleName,
        policy: &InlinePolicy,
    ) -> AppResult<()> {
        self.client
            .put_role_policy()
            .role_name(role_name.as_str())
            .policy_name(policy.name.as_str())
            .policy_document(policy.document.as_str())
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("put inline policy '{}' on role '{role_name}'", policy.name),
                    error,
                )
            })?;

        Ok(())
    }

    async fn list_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<String>> {
        let output = self
            .client
            .list_role_policies()
            .role_name(role_name.as_str())
            .set_marker(marker.map(ToOwned::to_owned))
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(&format!("list inline policies of role '{role_name}'"), error)
            })?;

        Ok(ListPage {
            items: output.policy_names().to_vec(),
            is_truncated: output.is_truncated(),
            marker: output.marker().map(ToOwned::to_owned),
        })
    }

    async fn delete_role_policy(&self, role_name: &RoleName, policy_name: &str) -> AppResult<()> {
        self.client
            .delete_role_policy()
            .role_name(role_name.as_str())
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("delete inline policy '{policy_name}' from role '{role_name}'"),
                    error,
                )
            })?;

        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &RoleName,
        policy_arn: &PolicyArn,
    ) -> AppResult<()> {
        self.client
            .attach_role_policy()
            .role_name(role_name.as_str())
            .policy_arn(policy_arn.as_str())
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("attach policy '{policy_arn}' to role '{role_name}'"),
                    error,
                )
            })?;

        Ok(())
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &RoleName,
        marker: Option<&str>,
    ) -> AppResult<ListPage<AttachedPolicy>> {
        let output = self
            .client
            .list_attached_role_policies()
            .role_name(role_name.as_str())
            .set_marker(marker.map(ToOwned::to_owned))
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("list attached policies of role '{role_name}'"),
                    error,
                )
            })?;

        let items = output
            .attached_policies()
            .iter()
            .filter_map(|attached| {
                let arn = attached.policy_arn()?;
                let name = attached
                    .policy_name()
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| short_policy_name(arn).to_owned());
                Some(AttachedPolicy::new(arn, name))
            })
            .collect();

        Ok(ListPage {
            items,
            is_truncated: output.is_truncated(),
            marker: output.marker().map(ToOwned::to_owned),
        })
    }

    async fn detach_role_policy(&self, role_name: &RoleName, policy_arn: &str) -> AppResult<()> {
        self.client
            .detach_role_policy()
            .role_name(role_name.as_str())
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|error| {
                map_sdk_error(
                    &format!("detach policy '{policy_arn}' from role '{role_name}'"),
                    error,
                )
            })?;

        Ok(())
    }
}

fn remote_role_from_sdk(role_name: &RoleName, role: &Role) -> AppResult<RemoteRole> {
    let max_session_duration = role
        .max_session_duration()
        .map(u32::try_from)
        .transpose()
        .map_err(|error| {
            AppError::PermanentRemote(format!(
                "role '{role_name}' reported an invalid max session duration: {error}"
            ))
        })?
        .unwrap_or(rolesync_domain::DEFAULT_MAX_SESSION_DURATION_SECONDS);

    let trust_relationship = decode_policy_document(
        role_name,
        role.assume_role_policy_document().unwrap_or_default(),
    )?;

    Ok(RemoteRole {
        arn: role.arn().to_owned(),
        role_id: role.role_id().to_owned(),
        description: role
            .description()
            .filter(|description| !description.is_empty())
            .map(ToOwned::to_owned),
        max_session_duration,
        trust_relationship,
    })
}

/// Reverses the URL encoding IAM applies to policy documents it returns.
fn decode_policy_document(role_name: &RoleName, document: &str) -> AppResult<String> {
    percent_decode_str(document)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|error| {
            AppError::PermanentRemote(format!(
                "trust policy of role '{role_name}' is not valid UTF-8 once decoded: {error}"
            ))
        })
}

fn session_duration_to_sdk(seconds: u32) -> AppResult<i32> {
    i32::try_from(seconds).map_err(|error| {
        AppError::Validation(format!("invalid max session duration {seconds}: {error}"))
    })
}

fn short_policy_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

#[cfg(test)]
mod tests {
    use rolesync_domain::RoleName;

    use super::{decode_policy_document, short_policy_name};

    #[test]
    fn trust_document_is_url_decoded() {
        let role_name = RoleName::new("app").unwrap_or_else(|_| unreachable!());

        let decoded = decode_policy_document(
            &role_name,
            "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D",
        );

        assert!(decoded.is_ok());
        assert_eq!(
            decoded.unwrap_or_default(),
            r#"{"Version":"2012-10-17","Statement":[]}"#
        );
    }

    #[test]
    fn plain_document_is_unchanged() {
        let role_name = RoleName::new("app").unwrap_or_else(|_| unreachable!());

        let decoded = decode_policy_document(&role_name, r#"{"Statement":[]}"#);

        assert_eq!(decoded.unwrap_or_default(), r#"{"Statement":[]}"#);
    }

    #[test]
    fn short_name_is_last_path_segment() {
        assert_eq!(
            short_policy_name("arn:aws:iam::aws:policy/job-function/ViewOnlyAccess"),
            "ViewOnlyAccess"
        );
    }
}
