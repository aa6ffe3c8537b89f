use async_trait::async_trait;
use rolesync_application::{ReconcileEvent, ReconcileEventSink};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// PostgreSQL-backed event log for reconcile outcomes.
#[derive(Clone)]
pub struct PostgresReconcileEventSink {
    pool: PgPool,
}

impl PostgresReconcileEventSink {
    /// Creates an event sink with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconcileEventSink for PostgresReconcileEventSink {
    async fn record_event(&self, event: ReconcileEvent) {
        let result = sqlx::query(
            r#"
            INSERT INTO iam_role_events (
                id,
                role_name,
                event_type,
                reason,
                message,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.role_name.as_str())
        .bind(event.event_type.as_str())
        .bind(event.reason.as_str())
        .bind(event.message.as_str())
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await;

        if let Err(error) = result {
            warn!(
                role_name = %event.role_name,
                reason = event.reason.as_str(),
                error = %error,
                "failed to record reconcile event"
            );
        }
    }
}
