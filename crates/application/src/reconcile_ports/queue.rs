use async_trait::async_trait;
use rolesync_core::AppResult;

/// Reconcile request leased to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedReconcileRequest {
    /// Role name exactly as enqueued.
    pub role_name: String,
    /// Lease token proving ownership of the claim.
    pub lease_token: String,
    /// Deliveries so far, including this one.
    pub attempts: u32,
}

/// Port for the queue that delivers "reconcile this role" requests.
///
/// A role has at most one request leased at a time.
#[async_trait]
pub trait ReconcileRequestQueue: Send + Sync {
    /// Enqueues every stored spec for drift correction; returns how many were added.
    async fn enqueue_resync(&self) -> AppResult<usize>;

    /// Leases up to `limit` due requests.
    async fn claim_requests(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedReconcileRequest>>;

    /// Pushes the lease expiry to `lease_seconds` from now.
    ///
    /// Returns `false` when the lease token no longer owns the request.
    async fn renew_lease(
        &self,
        request: &ClaimedReconcileRequest,
        lease_seconds: u32,
    ) -> AppResult<bool>;

    /// Removes a request after a successful pass, unless it changed meanwhile.
    async fn complete_request(&self, request: &ClaimedReconcileRequest) -> AppResult<()>;

    /// Returns a failed request to the queue for re-delivery after a delay.
    async fn release_request(
        &self,
        request: &ClaimedReconcileRequest,
        error: &str,
        retry_after_seconds: u32,
    ) -> AppResult<()>;
}
