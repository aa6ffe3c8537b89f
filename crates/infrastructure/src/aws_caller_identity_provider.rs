use async_trait::async_trait;
use aws_sdk_sts::Client;
use rolesync_application::CallerIdentityProvider;
use rolesync_core::{AppError, AppResult};

use crate::aws_error::map_sdk_error;

/// Caller identity adapter backed by STS `GetCallerIdentity`.
#[derive(Debug, Clone)]
pub struct AwsCallerIdentityProvider {
    client: Client,
}

impl AwsCallerIdentityProvider {
    /// Creates a provider over an STS client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallerIdentityProvider for AwsCallerIdentityProvider {
    async fn caller_account_id(&self) -> AppResult<String> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|error| map_sdk_error("look up caller identity", error))?;

        output
            .account()
            .filter(|account| !account.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                AppError::PermanentRemote("caller identity response named no account".to_owned())
            })
    }
}
