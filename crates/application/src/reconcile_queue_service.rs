use std::sync::Arc;
use std::time::Duration;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::RoleName;
use tracing::{info, warn};

use crate::reconcile_ports::{ClaimedReconcileRequest, ReconcileRequestQueue};
use crate::role_reconcile_service::RoleReconcileService;

/// Exponential re-delivery delay for failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_seconds: u32,
    max_seconds: u32,
}

impl RetryPolicy {
    /// Creates a policy; the ceiling is never below the base delay.
    #[must_use]
    pub fn new(base_seconds: u32, max_seconds: u32) -> Self {
        Self {
            base_seconds,
            max_seconds: max_seconds.max(base_seconds),
        }
    }

    /// Returns the delay before delivery number `attempts + 1`.
    ///
    /// Errors that cannot succeed without a spec change wait the full ceiling.
    #[must_use]
    pub fn delay_for(&self, attempts: u32, retryable: bool) -> u32 {
        if !retryable {
            return self.max_seconds;
        }

        let exponent = attempts.saturating_sub(1).min(31);
        self.base_seconds
            .saturating_mul(1_u32 << exponent)
            .min(self.max_seconds)
    }
}

/// Counters for one claimed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Requests leased in this batch.
    pub claimed: usize,
    /// Requests reconciled and completed.
    pub succeeded: usize,
    /// Requests released for re-delivery.
    pub failed: usize,
    /// Requests dropped because their role name is invalid.
    pub discarded: usize,
    /// Requests skipped because their lease was taken over before they ran.
    pub lost: usize,
}

/// Drains the reconcile queue through the reconcile service.
#[derive(Clone)]
pub struct ReconcileQueueService {
    queue: Arc<dyn ReconcileRequestQueue>,
    reconcile_service: RoleReconcileService,
    retry_policy: RetryPolicy,
}

impl ReconcileQueueService {
    /// Creates a queue service.
    #[must_use]
    pub fn new(
        queue: Arc<dyn ReconcileRequestQueue>,
        reconcile_service: RoleReconcileService,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            reconcile_service,
            retry_policy,
        }
    }

    /// Enqueues every stored spec for drift correction.
    pub async fn enqueue_resync(&self) -> AppResult<usize> {
        self.queue.enqueue_resync().await
    }

    /// Claims one batch and reconciles each request in turn.
    ///
    /// The lease of each request is renewed right before its reconcile, which
    /// runs under `reconcile_timeout`, so the timeout must be shorter than the
    /// lease. Failures and timeouts release the request with a backoff delay;
    /// queue bookkeeping failures are logged and left to lease expiry.
    pub async fn run_batch(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
        reconcile_timeout: Duration,
    ) -> AppResult<BatchSummary> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        if reconcile_timeout >= Duration::from_secs(u64::from(lease_seconds)) {
            return Err(AppError::Validation(format!(
                "reconcile timeout of {} seconds must be shorter than the {lease_seconds} second lease",
                reconcile_timeout.as_secs()
            )));
        }

        let claimed = self
            .queue
            .claim_requests(worker_id, limit, lease_seconds)
            .await?;
        let mut summary = BatchSummary {
            claimed: claimed.len(),
            ..BatchSummary::default()
        };

        for request in claimed {
            let Ok(role_name) = RoleName::new(request.role_name.as_str()) else {
                warn!(
                    worker_id,
                    role_name = %request.role_name,
                    "discarding reconcile request with invalid role name"
                );
                self.complete(worker_id, &request).await;
                summary.discarded += 1;
                continue;
            };

            if !self.renew(worker_id, &request, lease_seconds).await {
                summary.lost += 1;
                continue;
            }

            match tokio::time::timeout(
                reconcile_timeout,
                self.reconcile_service.reconcile(&role_name),
            )
            .await
            {
                Ok(Ok(outcome)) => {
                    info!(
                        worker_id,
                        role_name = %role_name,
                        outcome = outcome.as_str(),
                        attempts = request.attempts,
                        "role reconciled"
                    );
                    self.complete(worker_id, &request).await;
                    summary.succeeded += 1;
                }
                Ok(Err(error)) => {
                    let delay = self
                        .retry_policy
                        .delay_for(request.attempts, error.is_retryable());
                    self.release(worker_id, &request, &error.to_string(), delay)
                        .await;
                    summary.failed += 1;
                }
                Err(_) => {
                    let message = format!(
                        "reconcile timed out after {} seconds",
                        reconcile_timeout.as_secs()
                    );
                    let delay = self.retry_policy.delay_for(request.attempts, true);
                    self.release(worker_id, &request, &message, delay).await;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    // A request is only reconciled while this worker provably holds its lease.
    async fn renew(
        &self,
        worker_id: &str,
        request: &ClaimedReconcileRequest,
        lease_seconds: u32,
    ) -> bool {
        match self.queue.renew_lease(request, lease_seconds).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    worker_id,
                    role_name = %request.role_name,
                    "reconcile request lease was lost before it ran, skipping"
                );
                false
            }
            Err(error) => {
                warn!(
                    worker_id,
                    role_name = %request.role_name,
                    error = %error,
                    "failed to renew reconcile request lease, skipping"
                );
                false
            }
        }
    }

    async fn complete(&self, worker_id: &str, request: &ClaimedReconcileRequest) {
        if let Err(error) = self.queue.complete_request(request).await {
            warn!(
                worker_id,
                role_name = %request.role_name,
                error = %error,
                "failed to complete reconcile request"
            );
        }
    }

    async fn release(
        &self,
        worker_id: &str,
        request: &ClaimedReconcileRequest,
        error: &str,
        retry_after_seconds: u32,
    ) {
        warn!(
            worker_id,
            role_name = %request.role_name,
            attempts = request.attempts,
            retry_after_seconds,
            error,
            "role reconcile failed, releasing request"
        );

        if let Err(release_error) = self
            .queue
            .release_request(request, error, retry_after_seconds)
            .await
        {
            warn!(
                worker_id,
                role_name = %request.role_name,
                error = %release_error,
                "failed to release reconcile request"
            );
        }
    }
}

#[cfg(test)]
mod tests;
