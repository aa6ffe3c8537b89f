use std::sync::Arc;

use rolesync_core::{AppError, AppResult, ItemFailure};
use rolesync_domain::{FieldUpdate, MutationCategory, MutationPlan, RoleName, RoleStatus};
use tracing::{debug, warn};

use crate::policy_reference_resolver::PolicyReferenceResolver;
use crate::reconcile_ports::IamRoleGateway;
use crate::remote_state_reader::RemoteStateReader;

/// Result of applying one plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Identifiers returned by role creation, when the plan created the role.
    pub status: Option<RoleStatus>,
    /// Number of remote mutations that succeeded.
    pub applied: usize,
}

/// Result of removing a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The role existed and was removed.
    Deleted,
    /// Nothing was left to remove.
    AlreadyAbsent,
}

/// Executes mutation plans against the remote IAM service.
#[derive(Clone)]
pub struct MutationApplier {
    gateway: Arc<dyn IamRoleGateway>,
    resolver: Arc<PolicyReferenceResolver>,
    reader: RemoteStateReader,
}

impl MutationApplier {
    /// Creates an applier.
    #[must_use]
    pub fn new(gateway: Arc<dyn IamRoleGateway>, resolver: Arc<PolicyReferenceResolver>) -> Self {
        Self {
            reader: RemoteStateReader::new(gateway.clone()),
            gateway,
            resolver,
        }
    }

    /// Applies a plan in category order.
    ///
    /// Creation and field updates stop the pass on the first failure. Every
    /// other item is attempted; their failures are returned together as
    /// `AppError::Aggregate` once the whole plan has run.
    pub async fn apply(&self, plan: &MutationPlan) -> AppResult<ApplyReport> {
        let role_name = &plan.role_name;
        let mut report = ApplyReport {
            status: None,
            applied: 0,
        };

        if let Some(creation) = &plan.create_role {
            let status = self.gateway.create_role(role_name, creation).await?;
            debug!(role_name = %role_name, arn = %status.arn, "created role");
            report.status = Some(status);
            report.applied += 1;
        }

        for update in &plan.field_updates {
            self.apply_field_update(role_name, update).await?;
            debug!(role_name = %role_name, field = update.field_name(), "updated role field");
            report.applied += 1;
        }

        let mut failures = Vec::new();

        for policy in &plan.inline_policy_puts {
            let result = self.gateway.put_role_policy(role_name, policy).await;
            record(
                &mut report,
                &mut failures,
                role_name,
                MutationCategory::PutInlinePolicy,
                policy.name.as_str(),
                result,
            );
        }

        for policy_name in &plan.inline_policy_deletes {
            let result = tolerate_not_found(
                self.gateway
                    .delete_role_policy(role_name, policy_name.as_str())
                    .await,
            );
            record(
                &mut report,
                &mut failures,
                role_name,
                MutationCategory::DeleteInlinePolicy,
                policy_name.as_str(),
                result,
            );
        }

        for reference in &plan.policy_attachments {
            let result = match self.resolver.resolve(reference.as_str()).await {
                Ok(policy_arn) => {
                    self.gateway
                        .attach_role_policy(role_name, &policy_arn)
                        .await
                }
                Err(error) => Err(error),
            };
            record(
                &mut report,
                &mut failures,
                role_name,
                MutationCategory::AttachManagedPolicy,
                reference.as_str(),
                result,
            );
        }

        for attached in &plan.policy_detachments {
            let result = tolerate_not_found(
                self.gateway
                    .detach_role_policy(role_name, attached.arn.as_str())
                    .await,
            );
            record(
                &mut report,
                &mut failures,
                role_name,
                MutationCategory::DetachManagedPolicy,
                attached.arn.as_str(),
                result,
            );
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(AppError::Aggregate(failures))
        }
    }

    /// Removes a role with everything embedded in or attached to it.
    ///
    /// Inline policies go first, then attachments, then the role itself. The
    /// role deletion is attempted even when earlier items failed.
    pub async fn teardown(&self, role_name: &RoleName) -> AppResult<TeardownOutcome> {
        if !self.reader.exists(role_name).await? {
            debug!(role_name = %role_name, "role already absent");
            return Ok(TeardownOutcome::AlreadyAbsent);
        }

        let mut report = ApplyReport {
            status: None,
            applied: 0,
        };
        let mut failures = Vec::new();

        match self.reader.list_inline_policy_names(role_name).await {
            Ok(policy_names) => {
                for policy_name in policy_names {
                    let result = tolerate_not_found(
                        self.gateway
                            .delete_role_policy(role_name, policy_name.as_str())
                            .await,
                    );
                    record(
                        &mut report,
                        &mut failures,
                        role_name,
                        MutationCategory::DeleteInlinePolicy,
                        policy_name.as_str(),
                        result,
                    );
                }
            }
            Err(error) => failures.push(ItemFailure::new(
                "list_inline_policies",
                role_name.as_str(),
                error,
            )),
        }

        match self.reader.list_attached_policies(role_name).await {
            Ok(attached_policies) => {
                for attached in attached_policies {
                    let result = tolerate_not_found(
                        self.gateway
                            .detach_role_policy(role_name, attached.arn.as_str())
                            .await,
                    );
                    record(
                        &mut report,
                        &mut failures,
                        role_name,
                        MutationCategory::DetachManagedPolicy,
                        attached.arn.as_str(),
                        result,
                    );
                }
            }
            Err(error) => failures.push(ItemFailure::new(
                "list_attached_policies",
                role_name.as_str(),
                error,
            )),
        }

        let result = tolerate_not_found(self.gateway.delete_role(role_name).await);
        record(
            &mut report,
            &mut failures,
            role_name,
            MutationCategory::DeleteRole,
            role_name.as_str(),
            result,
        );

        if failures.is_empty() {
            Ok(TeardownOutcome::Deleted)
        } else {
            Err(AppError::Aggregate(failures))
        }
    }

    async fn apply_field_update(&self, role_name: &RoleName, update: &FieldUpdate) -> AppResult<()> {
        match update {
            FieldUpdate::Description(description) => {
                self.gateway
                    .update_role_description(role_name, description.as_deref())
                    .await
            }
            FieldUpdate::MaxSessionDuration(max_session_duration) => {
                self.gateway
                    .update_role_max_session_duration(role_name, *max_session_duration)
                    .await
            }
            FieldUpdate::TrustRelationship(document) => {
                self.gateway
                    .update_assume_role_policy(role_name, document.as_str())
                    .await
            }
        }
    }
}

fn record(
    report: &mut ApplyReport,
    failures: &mut Vec<ItemFailure>,
    role_name: &RoleName,
    category: MutationCategory,
    target: &str,
    result: AppResult<()>,
) {
    match result {
        Ok(()) => {
            debug!(role_name = %role_name, operation = category.as_str(), target, "applied mutation");
            report.applied += 1;
        }
        Err(error) => {
            warn!(
                role_name = %role_name,
                operation = category.as_str(),
                target,
                error = %error,
                "mutation failed"
            );
            failures.push(ItemFailure::new(category.as_str(), target, error));
        }
    }
}

// Removing something already gone is the desired end state.
fn tolerate_not_found(result: AppResult<()>) -> AppResult<()> {
    match result {
        Err(error) if error.is_not_found() => Ok(()),
        other => other,
    }
}
