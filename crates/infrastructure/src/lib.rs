//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aws_caller_identity_provider;
mod aws_error;
mod aws_iam_role_gateway;
mod in_memory_iam_service;
mod in_memory_role_spec_repository;
mod postgres_reconcile_event_sink;
mod postgres_reconcile_request_queue;
mod postgres_role_spec_repository;

pub use aws_caller_identity_provider::AwsCallerIdentityProvider;
pub use aws_iam_role_gateway::AwsIamRoleGateway;
pub use in_memory_iam_service::InMemoryIamService;
pub use in_memory_role_spec_repository::InMemoryRoleSpecRepository;
pub use postgres_reconcile_event_sink::PostgresReconcileEventSink;
pub use postgres_reconcile_request_queue::PostgresReconcileRequestQueue;
pub use postgres_role_spec_repository::PostgresRoleSpecRepository;
