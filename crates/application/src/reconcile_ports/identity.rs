use async_trait::async_trait;
use rolesync_core::AppResult;

/// Port for the identity service that names the caller's own account.
#[async_trait]
pub trait CallerIdentityProvider: Send + Sync {
    /// Returns the account id the remote credentials belong to.
    async fn caller_account_id(&self) -> AppResult<String>;
}
