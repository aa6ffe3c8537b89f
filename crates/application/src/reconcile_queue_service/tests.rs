use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rolesync_core::{AppError, AppResult};
use rolesync_domain::RoleSpecInput;
use tokio::sync::Mutex;

use super::{BatchSummary, ReconcileQueueService, RetryPolicy};
use crate::reconcile_ports::{ClaimedReconcileRequest, ReconcileRequestQueue};
use crate::role_reconcile_service::RoleReconcileService;
use crate::testing::{
    FakeIamService, FakeRoleSpecRepository, RecordingEventSink, role_spec, sample_spec_input,
};

#[derive(Default)]
struct FakeReconcileQueue {
    pending: Mutex<Vec<ClaimedReconcileRequest>>,
    completed: Mutex<Vec<String>>,
    released: Mutex<Vec<(String, String, u32)>>,
    renewed: Mutex<Vec<(String, u32)>>,
    lost_leases: Mutex<HashSet<String>>,
}

impl FakeReconcileQueue {
    async fn push(&self, role_name: &str, attempts: u32) {
        self.pending.lock().await.push(ClaimedReconcileRequest {
            role_name: role_name.to_owned(),
            lease_token: format!("lease-{role_name}"),
            attempts,
        });
    }
}

#[async_trait]
impl ReconcileRequestQueue for FakeReconcileQueue {
    async fn enqueue_resync(&self) -> AppResult<usize> {
        Ok(self.pending.lock().await.len())
    }

    async fn claim_requests(
        &self,
        _worker_id: &str,
        limit: usize,
        _lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedReconcileRequest>> {
        let mut pending = self.pending.lock().await;
        let count = limit.min(pending.len());
        Ok(pending.drain(..count).collect())
    }

    async fn renew_lease(
        &self,
        request: &ClaimedReconcileRequest,
        lease_seconds: u32,
    ) -> AppResult<bool> {
        if self.lost_leases.lock().await.contains(&request.role_name) {
            return Ok(false);
        }

        self.renewed
            .lock()
            .await
            .push((request.role_name.clone(), lease_seconds));
        Ok(true)
    }

    async fn complete_request(&self, request: &ClaimedReconcileRequest) -> AppResult<()> {
        self.completed.lock().await.push(request.role_name.clone());
        Ok(())
    }

    async fn release_request(
        &self,
        request: &ClaimedReconcileRequest,
        error: &str,
        retry_after_seconds: u32,
    ) -> AppResult<()> {
        self.released.lock().await.push((
            request.role_name.clone(),
            error.to_owned(),
            retry_after_seconds,
        ));
        Ok(())
    }
}

struct Harness {
    iam: Arc<FakeIamService>,
    repository: Arc<FakeRoleSpecRepository>,
    queue: Arc<FakeReconcileQueue>,
    service: ReconcileQueueService,
}

fn harness() -> Harness {
    let iam = Arc::new(FakeIamService::default());
    let repository = Arc::new(FakeRoleSpecRepository::default());
    let queue = Arc::new(FakeReconcileQueue::default());
    let reconcile_service = RoleReconcileService::new(
        repository.clone(),
        iam.clone(),
        iam.clone(),
        Arc::new(RecordingEventSink::default()),
    );
    let service =
        ReconcileQueueService::new(queue.clone(), reconcile_service, RetryPolicy::new(5, 300));

    Harness {
        iam,
        repository,
        queue,
        service,
    }
}

#[test]
fn retry_delay_doubles_up_to_ceiling() {
    let policy = RetryPolicy::new(5, 300);

    assert_eq!(policy.delay_for(0, true), 5);
    assert_eq!(policy.delay_for(1, true), 5);
    assert_eq!(policy.delay_for(3, true), 20);
    assert_eq!(policy.delay_for(7, true), 300);
    assert_eq!(policy.delay_for(u32::MAX, true), 300);
    assert_eq!(policy.delay_for(1, false), 300);
}

#[tokio::test]
async fn batch_completes_successes_and_releases_failures() {
    let harness = harness();
    harness.repository.insert(role_spec(sample_spec_input())).await;
    harness
        .repository
        .insert(role_spec(RoleSpecInput {
            name: "broken".to_owned(),
            trust_relationship: "T1".to_owned(),
            ..RoleSpecInput::default()
        }))
        .await;
    harness.iam.fail_on("create_role", "broken").await;
    harness.queue.push("sample-role", 1).await;
    harness.queue.push("broken", 2).await;

    let summary = harness
        .service
        .run_batch("worker-1", 10, 60, Duration::from_secs(45))
        .await;

    assert!(summary.is_ok());
    assert_eq!(
        summary.unwrap_or_else(|_| unreachable!()),
        BatchSummary {
            claimed: 2,
            succeeded: 1,
            failed: 1,
            discarded: 0,
            lost: 0,
        }
    );
    assert_eq!(
        *harness.queue.completed.lock().await,
        vec!["sample-role".to_owned()]
    );

    let released = harness.queue.released.lock().await;
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].0, "broken");
    assert!(released[0].1.contains("injected create_role failure"));
    assert_eq!(released[0].2, 10);
    assert_eq!(
        *harness.queue.renewed.lock().await,
        vec![("sample-role".to_owned(), 60), ("broken".to_owned(), 60)]
    );
}

#[tokio::test]
async fn invalid_role_name_is_discarded() {
    let harness = harness();
    harness.queue.push("not a role name", 1).await;

    let summary = harness
        .service
        .run_batch("worker-1", 10, 60, Duration::from_secs(45))
        .await;

    assert!(summary.is_ok());
    assert_eq!(summary.unwrap_or_else(|_| unreachable!()).discarded, 1);
    assert_eq!(
        *harness.queue.completed.lock().await,
        vec!["not a role name".to_owned()]
    );
    assert!(harness.iam.calls().await.is_empty());
}

#[tokio::test]
async fn batch_rejects_zero_limit() {
    let harness = harness();

    let result = harness
        .service
        .run_batch("worker-1", 0, 60, Duration::from_secs(45))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn request_with_lost_lease_is_skipped_without_remote_calls() {
    let harness = harness();
    harness.repository.insert(role_spec(sample_spec_input())).await;
    harness.queue.push("sample-role", 1).await;
    harness
        .queue
        .lost_leases
        .lock()
        .await
        .insert("sample-role".to_owned());

    let summary = harness
        .service
        .run_batch("worker-1", 10, 60, Duration::from_secs(45))
        .await;

    assert!(summary.is_ok());
    assert_eq!(
        summary.unwrap_or_else(|_| unreachable!()),
        BatchSummary {
            claimed: 1,
            lost: 1,
            ..BatchSummary::default()
        }
    );
    assert!(harness.iam.calls().await.is_empty());
    assert!(harness.queue.completed.lock().await.is_empty());
    assert!(harness.queue.released.lock().await.is_empty());
}

#[tokio::test]
async fn batch_rejects_timeout_not_shorter_than_lease() {
    let harness = harness();
    harness.queue.push("sample-role", 1).await;

    let result = harness
        .service
        .run_batch("worker-1", 10, 60, Duration::from_secs(60))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(harness.queue.pending.lock().await.len(), 1);
}
