mod events;
mod gateway;
mod identity;
mod queue;
mod repository;

pub use events::{ReconcileEvent, ReconcileEventReason, ReconcileEventSink, ReconcileEventType};
pub use gateway::{IamRoleGateway, ListPage};
pub use identity::CallerIdentityProvider;
pub use queue::{ClaimedReconcileRequest, ReconcileRequestQueue};
pub use repository::{RoleSpecDocument, RoleSpecRepository};
