use async_trait::async_trait;
use rolesync_application::{ClaimedReconcileRequest, ReconcileRequestQueue};
use rolesync_core::{AppError, AppResult};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed reconcile request queue.
///
/// Rows are keyed by role name, so a role has at most one request and at
/// most one lease at a time. Spec changes enqueue through a table trigger.
#[derive(Clone)]
pub struct PostgresReconcileRequestQueue {
    pool: PgPool,
}

impl PostgresReconcileRequestQueue {
    /// Creates a queue with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClaimedReconcileRequestRow {
    role_name: String,
    lease_token: String,
    attempts: i32,
}

#[async_trait]
impl ReconcileRequestQueue for PostgresReconcileRequestQueue {
    async fn enqueue_resync(&self) -> AppResult<usize> {
        let result = sqlx::query(
            r#"
            INSERT INTO iam_role_reconcile_requests (
                role_name,
                status,
                attempts,
                dirty,
                available_at,
                created_at,
                updated_at
            )
            SELECT role_name, 'pending', 0, FALSE, now(), now(), now()
            FROM iam_role_specs
            ON CONFLICT (role_name)
            DO NOTHING
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to enqueue role resync requests: {error}"))
        })?;

        usize::try_from(result.rows_affected()).map_err(|error| {
            AppError::Internal(format!("invalid resync request count: {error}"))
        })
    }

    async fn claim_requests(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedReconcileRequest>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start reconcile request claim transaction: {error}"
            ))
        })?;

        let rows = sqlx::query_as::<_, ClaimedReconcileRequestRow>(
            r#"
            WITH candidate_requests AS (
                SELECT role_name
                FROM iam_role_reconcile_requests
                WHERE (status = 'pending' AND available_at <= now())
                   OR (status = 'leased' AND lease_expires_at < now())
                ORDER BY available_at ASC, role_name ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE iam_role_reconcile_requests requests
            SET
                status = 'leased',
                attempts = requests.attempts + 1,
                dirty = FALSE,
                leased_by = $2,
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                updated_at = now()
            FROM candidate_requests
            WHERE requests.role_name = candidate_requests.role_name
            RETURNING requests.role_name, requests.lease_token, requests.attempts
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid reconcile claim limit: {error}"))
        })?)
        .bind(worker_id)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid reconcile lease_seconds: {error}"))
        })?)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim reconcile requests for worker '{worker_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit reconcile request claim transaction: {error}"
            ))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(ClaimedReconcileRequest {
                    attempts: u32::try_from(row.attempts).map_err(|error| {
                        AppError::Internal(format!(
                            "invalid attempts stored for reconcile request '{}': {error}",
                            row.role_name
                        ))
                    })?,
                    role_name: row.role_name,
                    lease_token: row.lease_token,
                })
            })
            .collect()
    }

    async fn renew_lease(
        &self,
        request: &ClaimedReconcileRequest,
        lease_seconds: u32,
    ) -> AppResult<bool> {
        let role_name = request.role_name.as_str();
        let result = sqlx::query(
            r#"
            UPDATE iam_role_reconcile_requests
            SET
                lease_expires_at = now() + make_interval(secs => $3::INT),
                updated_at = now()
            WHERE role_name = $1
              AND lease_token = $2
              AND status = 'leased'
            "#,
        )
        .bind(role_name)
        .bind(request.lease_token.as_str())
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid reconcile lease_seconds: {error}"))
        })?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to renew reconcile request lease for role '{role_name}': {error}"
            ))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_request(&self, request: &ClaimedReconcileRequest) -> AppResult<()> {
        let role_name = request.role_name.as_str();
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start reconcile request completion transaction: {error}"
            ))
        })?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM iam_role_reconcile_requests
            WHERE role_name = $1
              AND lease_token = $2
              AND status = 'leased'
              AND dirty = FALSE
            "#,
        )
        .bind(role_name)
        .bind(request.lease_token.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete reconcile request for role '{role_name}': {error}"
            ))
        })?;

        if deleted.rows_affected() == 0 {
            // Spec changed while leased: run again right away.
            let requeued = sqlx::query(
                r#"
                UPDATE iam_role_reconcile_requests
                SET
                    status = 'pending',
                    attempts = 0,
                    dirty = FALSE,
                    available_at = now(),
                    leased_by = NULL,
                    lease_token = NULL,
                    lease_expires_at = NULL,
                    last_error = NULL,
                    updated_at = now()
                WHERE role_name = $1
                  AND lease_token = $2
                  AND status = 'leased'
                  AND dirty = TRUE
                "#,
            )
            .bind(role_name)
            .bind(request.lease_token.as_str())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to re-queue changed reconcile request for role '{role_name}': {error}"
                ))
            })?;

            if requeued.rows_affected() == 0 {
                return Err(AppError::NotFound(format!(
                    "reconcile request for role '{role_name}' is no longer leased with the given token"
                )));
            }
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit reconcile request completion for role '{role_name}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn release_request(
        &self,
        request: &ClaimedReconcileRequest,
        error: &str,
        retry_after_seconds: u32,
    ) -> AppResult<()> {
        let role_name = request.role_name.as_str();
        let result = sqlx::query(
            r#"
            UPDATE iam_role_reconcile_requests
            SET
                status = 'pending',
                available_at = CASE
                    WHEN dirty THEN now()
                    ELSE now() + make_interval(secs => $3::INT)
                END,
                attempts = CASE WHEN dirty THEN 0 ELSE attempts END,
                dirty = FALSE,
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $4,
                updated_at = now()
            WHERE role_name = $1
              AND lease_token = $2
              AND status = 'leased'
            "#,
        )
        .bind(role_name)
        .bind(request.lease_token.as_str())
        .bind(i32::try_from(retry_after_seconds).map_err(|error| {
            AppError::Validation(format!("invalid reconcile retry delay: {error}"))
        })?)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|release_error| {
            AppError::Internal(format!(
                "failed to release reconcile request for role '{role_name}': {release_error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "reconcile request for role '{role_name}' is no longer leased with the given token"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
