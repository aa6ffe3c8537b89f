use async_trait::async_trait;
use rolesync_application::{RoleSpecDocument, RoleSpecRepository};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{InlinePolicy, RoleName, RoleSpec, RoleSpecInput, RoleStatus};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed desired-state store.
#[derive(Clone)]
pub struct PostgresRoleSpecRepository {
    pool: PgPool,
}

impl PostgresRoleSpecRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a spec; stored status is kept.
    pub async fn save_role_spec(&self, spec: &RoleSpec) -> AppResult<()> {
        let role_name = spec.name();
        let inline_policies = serde_json::to_value(spec.inline_policies()).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize inline policies of role spec '{role_name}': {error}"
            ))
        })?;
        let managed_policy_references = serde_json::to_value(spec.managed_policy_references())
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to serialize managed policy references of role spec '{role_name}': {error}"
                ))
            })?;
        let max_session_duration = i32::try_from(spec.max_session_duration()).map_err(|error| {
            AppError::Validation(format!(
                "invalid max session duration for role spec '{role_name}': {error}"
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO iam_role_specs (
                role_name,
                description,
                path,
                max_session_duration,
                trust_relationship,
                inline_policies,
                managed_policy_references,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
            ON CONFLICT (role_name)
            DO UPDATE SET
                description = EXCLUDED.description,
                path = EXCLUDED.path,
                max_session_duration = EXCLUDED.max_session_duration,
                trust_relationship = EXCLUDED.trust_relationship,
                inline_policies = EXCLUDED.inline_policies,
                managed_policy_references = EXCLUDED.managed_policy_references,
                updated_at = now()
            "#,
        )
        .bind(role_name.as_str())
        .bind(spec.description())
        .bind(spec.path())
        .bind(max_session_duration)
        .bind(spec.trust_relationship())
        .bind(inline_policies)
        .bind(managed_policy_references)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to save role spec '{role_name}': {error}"))
        })?;

        Ok(())
    }

    /// Deletes a spec; returns whether one existed.
    pub async fn delete_role_spec(&self, role_name: &RoleName) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM iam_role_specs
            WHERE role_name = $1
            "#,
        )
        .bind(role_name.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to delete role spec '{role_name}': {error}"))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, FromRow)]
struct RoleSpecRow {
    role_name: String,
    description: Option<String>,
    path: String,
    max_session_duration: i32,
    trust_relationship: String,
    inline_policies: Value,
    managed_policy_references: Value,
    status_arn: Option<String>,
    status_role_id: Option<String>,
}

#[async_trait]
impl RoleSpecRepository for PostgresRoleSpecRepository {
    async fn find_role_spec(&self, role_name: &RoleName) -> AppResult<Option<RoleSpecDocument>> {
        let row = sqlx::query_as::<_, RoleSpecRow>(
            r#"
            SELECT
                role_name,
                description,
                path,
                max_session_duration,
                trust_relationship,
                inline_policies,
                managed_policy_references,
                status_arn,
                status_role_id
            FROM iam_role_specs
            WHERE role_name = $1
            "#,
        )
        .bind(role_name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find role spec '{role_name}': {error}"))
        })?;

        row.map(role_spec_document_from_row).transpose()
    }

    async fn save_role_status(&self, role_name: &RoleName, status: &RoleStatus) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE iam_role_specs
            SET
                status_arn = $2,
                status_role_id = $3,
                updated_at = now()
            WHERE role_name = $1
            "#,
        )
        .bind(role_name.as_str())
        .bind(status.arn.as_str())
        .bind(status.role_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save status of role spec '{role_name}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "role spec '{role_name}' does not exist"
            )));
        }

        Ok(())
    }
}

fn role_spec_document_from_row(row: RoleSpecRow) -> AppResult<RoleSpecDocument> {
    let role_name = row.role_name;
    let inline_policies: Vec<InlinePolicy> = serde_json::from_value(row.inline_policies)
        .map_err(|error| {
            AppError::Internal(format!(
                "invalid inline policies stored for role spec '{role_name}': {error}"
            ))
        })?;
    let managed_policy_references: Vec<String> =
        serde_json::from_value(row.managed_policy_references).map_err(|error| {
            AppError::Internal(format!(
                "invalid managed policy references stored for role spec '{role_name}': {error}"
            ))
        })?;
    let max_session_duration = u32::try_from(row.max_session_duration).map_err(|error| {
        AppError::Internal(format!(
            "invalid max session duration stored for role spec '{role_name}': {error}"
        ))
    })?;

    let status = match (row.status_arn, row.status_role_id) {
        (Some(arn), Some(role_id)) => Some(RoleStatus { arn, role_id }),
        _ => None,
    };

    let spec = RoleSpec::new(RoleSpecInput {
        name: role_name,
        description: row.description,
        path: Some(row.path),
        max_session_duration: Some(max_session_duration),
        trust_relationship: row.trust_relationship,
        inline_policies,
        managed_policy_references,
    })?;

    Ok(RoleSpecDocument { spec, status })
}
