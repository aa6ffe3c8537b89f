use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolesync_domain::RoleName;

/// Severity of a reconcile notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileEventType {
    /// Informational outcome.
    Normal,
    /// Failed outcome that needs attention.
    Warning,
}

impl ReconcileEventType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
        }
    }
}

/// Machine-readable reason attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileEventReason {
    /// Role was created and its status stored.
    RoleCreated,
    /// Existing role was converged onto its spec.
    RoleUpdated,
    /// Create path failed.
    ErrorCreatingRole,
    /// Sync path failed.
    ErrorSyncingRole,
    /// Role exists but its identifiers could not be written back.
    ErrorPersistingRoleStatus,
}

impl ReconcileEventReason {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "RoleCreated",
            Self::RoleUpdated => "RoleUpdated",
            Self::ErrorCreatingRole => "ErrorCreatingRole",
            Self::ErrorSyncingRole => "ErrorSyncingRole",
            Self::ErrorPersistingRoleStatus => "ErrorPersistingRoleStatus",
        }
    }

    /// Returns the severity this reason is reported with.
    #[must_use]
    pub fn event_type(&self) -> ReconcileEventType {
        match self {
            Self::RoleCreated | Self::RoleUpdated => ReconcileEventType::Normal,
            Self::ErrorCreatingRole | Self::ErrorSyncingRole | Self::ErrorPersistingRoleStatus => {
                ReconcileEventType::Warning
            }
        }
    }
}

/// Human-readable notification attributed to one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    /// Role the event is about.
    pub role_name: RoleName,
    /// Severity.
    pub event_type: ReconcileEventType,
    /// Reason code.
    pub reason: ReconcileEventReason,
    /// Message shown to operators.
    pub message: String,
    /// Time the outcome was observed.
    pub occurred_at: DateTime<Utc>,
}

impl ReconcileEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(role_name: RoleName, reason: ReconcileEventReason, message: impl Into<String>) -> Self {
        Self {
            role_name,
            event_type: reason.event_type(),
            reason,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Fire-and-forget port for reconcile notifications.
///
/// Implementations swallow their own failures.
#[async_trait]
pub trait ReconcileEventSink: Send + Sync {
    /// Records one notification.
    async fn record_event(&self, event: ReconcileEvent);
}
