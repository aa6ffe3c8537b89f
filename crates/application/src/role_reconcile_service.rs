use std::sync::Arc;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{RoleName, RoleStatus, plan_role_convergence, plan_role_creation};
use tracing::{info, warn};

use crate::mutation_applier::{MutationApplier, TeardownOutcome};
use crate::policy_reference_resolver::PolicyReferenceResolver;
use crate::reconcile_ports::{
    CallerIdentityProvider, IamRoleGateway, ReconcileEvent, ReconcileEventReason,
    ReconcileEventSink, RoleSpecDocument, RoleSpecRepository,
};
use crate::remote_state_reader::RemoteStateReader;

/// What one reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Role was created and its identifiers stored.
    Created(RoleStatus),
    /// Existing role was converged.
    Synced {
        /// Whether any drift was corrected.
        changed: bool,
    },
    /// Spec is gone and the remote role has been removed.
    TornDown,
}

impl ReconcileOutcome {
    /// Returns stable log label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Synced { changed: true } => "synced",
            Self::Synced { changed: false } => "unchanged",
            Self::TornDown => "torn_down",
        }
    }
}

/// Reconcile entry point, invoked once per request for a role name.
#[derive(Clone)]
pub struct RoleReconcileService {
    spec_repository: Arc<dyn RoleSpecRepository>,
    reader: RemoteStateReader,
    applier: MutationApplier,
    event_sink: Arc<dyn ReconcileEventSink>,
}

impl RoleReconcileService {
    /// Creates the reconcile service from its ports.
    #[must_use]
    pub fn new(
        spec_repository: Arc<dyn RoleSpecRepository>,
        gateway: Arc<dyn IamRoleGateway>,
        identity_provider: Arc<dyn CallerIdentityProvider>,
        event_sink: Arc<dyn ReconcileEventSink>,
    ) -> Self {
        let resolver = Arc::new(PolicyReferenceResolver::new(identity_provider));

        Self {
            spec_repository,
            reader: RemoteStateReader::new(gateway.clone()),
            applier: MutationApplier::new(gateway, resolver),
            event_sink,
        }
    }

    /// Drives the remote role named `role_name` toward its stored spec.
    ///
    /// A missing spec tears the role down. Otherwise the role is created when
    /// absent remotely and converged when present. Errors are returned for the
    /// caller to re-deliver; nothing is retried here.
    pub async fn reconcile(&self, role_name: &RoleName) -> AppResult<ReconcileOutcome> {
        let Some(document) = self.spec_repository.find_role_spec(role_name).await? else {
            info!(role_name = %role_name, "role spec is gone, tearing down remote role");
            let outcome = self.applier.teardown(role_name).await?;
            info!(
                role_name = %role_name,
                already_absent = outcome == TeardownOutcome::AlreadyAbsent,
                "remote role torn down"
            );
            return Ok(ReconcileOutcome::TornDown);
        };

        let exists = match self.reader.exists(role_name).await {
            Ok(exists) => exists,
            Err(error) => {
                return Err(self
                    .report_failure(role_name, ReconcileEventReason::ErrorSyncingRole, error)
                    .await);
            }
        };

        if exists {
            info!(role_name = %role_name, "role exists, syncing");
            self.sync(role_name, &document).await
        } else {
            info!(role_name = %role_name, "role does not exist, creating");
            self.create(role_name, &document).await
        }
    }

    async fn create(
        &self,
        role_name: &RoleName,
        document: &RoleSpecDocument,
    ) -> AppResult<ReconcileOutcome> {
        let plan = plan_role_creation(&document.spec);

        let report = match self.applier.apply(&plan).await {
            Ok(report) => report,
            Err(error) => {
                return Err(self
                    .report_failure(role_name, ReconcileEventReason::ErrorCreatingRole, error)
                    .await);
            }
        };

        let Some(status) = report.status else {
            return Err(AppError::Internal(format!(
                "creating role '{role_name}' returned no identifiers"
            )));
        };

        self.persist_status(role_name, &status).await?;

        info!(
            role_name = %role_name,
            arn = %status.arn,
            role_id = %status.role_id,
            applied = report.applied,
            "role created"
        );
        self.emit(
            role_name,
            ReconcileEventReason::RoleCreated,
            format!("created role {role_name} ({})", status.arn),
        )
        .await;

        Ok(ReconcileOutcome::Created(status))
    }

    async fn sync(
        &self,
        role_name: &RoleName,
        document: &RoleSpecDocument,
    ) -> AppResult<ReconcileOutcome> {
        let remote = match self.reader.describe(role_name).await {
            Ok(remote) => remote,
            Err(error) => {
                return Err(self
                    .report_failure(role_name, ReconcileEventReason::ErrorSyncingRole, error)
                    .await);
            }
        };

        let plan = plan_role_convergence(&document.spec, &remote);
        let drift = plan.drift_count();

        if let Err(error) = self.applier.apply(&plan).await {
            return Err(self
                .report_failure(role_name, ReconcileEventReason::ErrorSyncingRole, error)
                .await);
        }

        // Status is written once; a role created before its status could be
        // stored gets it filled in here.
        if document.status.is_none() {
            self.persist_status(role_name, &remote.role.status())
                .await?;
        }

        info!(role_name = %role_name, drift, "role synced");
        let message = if drift == 0 {
            format!("role {role_name} is in sync")
        } else {
            format!("corrected {drift} drifted setting(s) on role {role_name}")
        };
        self.emit(role_name, ReconcileEventReason::RoleUpdated, message)
            .await;

        Ok(ReconcileOutcome::Synced { changed: drift > 0 })
    }

    async fn persist_status(&self, role_name: &RoleName, status: &RoleStatus) -> AppResult<()> {
        if let Err(error) = self
            .spec_repository
            .save_role_status(role_name, status)
            .await
        {
            return Err(self
                .report_failure(
                    role_name,
                    ReconcileEventReason::ErrorPersistingRoleStatus,
                    error,
                )
                .await);
        }

        Ok(())
    }

    async fn report_failure(
        &self,
        role_name: &RoleName,
        reason: ReconcileEventReason,
        error: AppError,
    ) -> AppError {
        warn!(
            role_name = %role_name,
            reason = reason.as_str(),
            error = %error,
            "role reconcile failed"
        );
        self.emit(role_name, reason, error.to_string()).await;
        error
    }

    async fn emit(&self, role_name: &RoleName, reason: ReconcileEventReason, message: String) {
        self.event_sink
            .record_event(ReconcileEvent::new(role_name.clone(), reason, message))
            .await;
    }
}
