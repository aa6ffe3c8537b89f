use rolesync_application::{ClaimedReconcileRequest, ReconcileRequestQueue};
use rolesync_domain::{RoleName, RoleSpec, RoleSpecInput};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PostgresReconcileRequestQueue;
use crate::PostgresRoleSpecRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const CLAIM_LIMIT: usize = 1000;

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres reconcile queue tests: {error}");
    }

    Some(pool)
}

fn spec(role_name: &RoleName, trust_relationship: &str) -> RoleSpec {
    RoleSpec::new(RoleSpecInput {
        name: role_name.as_str().to_owned(),
        trust_relationship: trust_relationship.to_owned(),
        ..RoleSpecInput::default()
    })
    .unwrap_or_else(|_| unreachable!())
}

async fn claim_own(
    queue: &PostgresReconcileRequestQueue,
    role_name: &RoleName,
) -> Option<ClaimedReconcileRequest> {
    let claimed = queue.claim_requests("queue-test", CLAIM_LIMIT, 60).await;
    assert!(claimed.is_ok());

    claimed
        .unwrap_or_default()
        .into_iter()
        .find(|request| request.role_name == role_name.as_str())
}

async fn request_exists(pool: &PgPool, role_name: &RoleName) -> bool {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM iam_role_reconcile_requests WHERE role_name = $1",
    )
    .bind(role_name.as_str())
    .fetch_one(pool)
    .await;
    assert!(count.is_ok());
    count.unwrap_or_default() > 0
}

#[tokio::test]
async fn spec_changes_drive_request_lifecycle() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleSpecRepository::new(pool.clone());
    let queue = PostgresReconcileRequestQueue::new(pool.clone());
    let role_name = RoleName::new(format!("queue-test-{}", Uuid::new_v4().simple()))
        .unwrap_or_else(|_| unreachable!());

    assert!(repository.save_role_spec(&spec(&role_name, "T1")).await.is_ok());

    let first = claim_own(&queue, &role_name).await;
    assert!(first.is_some());
    let first = first.unwrap_or_else(|| unreachable!());
    assert_eq!(first.attempts, 1);
    assert!(matches!(queue.renew_lease(&first, 60).await, Ok(true)));

    // A change during the lease survives completion.
    assert!(repository.save_role_spec(&spec(&role_name, "T2")).await.is_ok());
    assert!(queue.complete_request(&first).await.is_ok());
    assert!(request_exists(&pool, &role_name).await);

    let second = claim_own(&queue, &role_name).await;
    assert!(second.is_some());
    let second = second.unwrap_or_else(|| unreachable!());
    assert_eq!(second.attempts, 1);

    // Released requests wait out their delay.
    assert!(queue.release_request(&second, "throttled", 3600).await.is_ok());
    assert!(claim_own(&queue, &role_name).await.is_none());
    assert!(queue.complete_request(&second).await.is_err());
    assert!(matches!(queue.renew_lease(&second, 60).await, Ok(false)));

    // Deleting the spec makes the request due again for teardown.
    assert!(repository.delete_role_spec(&role_name).await.is_ok());
    let teardown = claim_own(&queue, &role_name).await;
    assert!(teardown.is_some());
    let teardown = teardown.unwrap_or_else(|| unreachable!());
    assert_eq!(teardown.attempts, 1);
    assert!(queue.complete_request(&teardown).await.is_ok());
    assert!(!request_exists(&pool, &role_name).await);
}
