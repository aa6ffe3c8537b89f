use std::sync::Arc;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{PolicyArn, is_canonical_policy_reference};
use tokio::sync::OnceCell;

use crate::reconcile_ports::CallerIdentityProvider;

/// Turns managed policy references into canonical identifiers.
pub struct PolicyReferenceResolver {
    identity_provider: Arc<dyn CallerIdentityProvider>,
    account_id: OnceCell<String>,
}

impl PolicyReferenceResolver {
    /// Creates a resolver backed by the caller identity endpoint.
    #[must_use]
    pub fn new(identity_provider: Arc<dyn CallerIdentityProvider>) -> Self {
        Self {
            identity_provider,
            account_id: OnceCell::new(),
        }
    }

    /// Resolves one reference.
    ///
    /// Canonical identifiers pass through without a remote call. Short names are
    /// expanded against the caller's account, looked up once and then cached.
    pub async fn resolve(&self, reference: &str) -> AppResult<PolicyArn> {
        if is_canonical_policy_reference(reference) {
            return PolicyArn::parse(reference);
        }

        let account_id = self
            .account_id
            .get_or_try_init(|| async {
                self.identity_provider.caller_account_id().await
            })
            .await
            .map_err(|error| {
                AppError::Resolution(format!(
                    "failed to resolve managed policy '{reference}': {error}"
                ))
            })?;

        PolicyArn::for_account_policy(account_id, reference)
    }
}
