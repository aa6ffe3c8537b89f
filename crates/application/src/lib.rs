//! Application services and ports.

#![forbid(unsafe_code)]

mod mutation_applier;
mod policy_reference_resolver;
mod reconcile_ports;
mod reconcile_queue_service;
mod remote_state_reader;
mod role_reconcile_service;

#[cfg(test)]
mod testing;

pub use mutation_applier::{ApplyReport, MutationApplier, TeardownOutcome};
pub use policy_reference_resolver::PolicyReferenceResolver;
pub use reconcile_ports::{
    CallerIdentityProvider, ClaimedReconcileRequest, IamRoleGateway, ListPage, ReconcileEvent,
    ReconcileEventReason, ReconcileEventSink, ReconcileEventType, ReconcileRequestQueue,
    RoleSpecDocument, RoleSpecRepository,
};
pub use reconcile_queue_service::{BatchSummary, ReconcileQueueService, RetryPolicy};
pub use remote_state_reader::RemoteStateReader;
pub use role_reconcile_service::{ReconcileOutcome, RoleReconcileService};
