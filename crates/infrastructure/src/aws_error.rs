use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use rolesync_core::AppError;

const NOT_FOUND_CODES: &[&str] = &["NoSuchEntity"];

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceFailure",
    "ServiceUnavailable",
    "ConcurrentModification",
    "InternalFailure",
];

/// Maps an SDK failure onto the shared error taxonomy.
///
/// `context` names the operation and its target, e.g. `get role 'app'`.
pub(crate) fn map_sdk_error<E, R>(context: &str, error: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("failed to {context}: {}", DisplayErrorContext(&error));

    match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AppError::TransientRemote(message)
        }
        SdkError::ServiceError(service_error) => match service_error.err().code() {
            Some(code) if NOT_FOUND_CODES.contains(&code) => AppError::NotFound(message),
            Some(code) if TRANSIENT_CODES.contains(&code) => AppError::TransientRemote(message),
            _ => AppError::PermanentRemote(message),
        },
        _ => AppError::PermanentRemote(message),
    }
}
