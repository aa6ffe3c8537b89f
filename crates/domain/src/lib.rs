//! Domain entities, invariants and the convergence planner.

#![forbid(unsafe_code)]

mod plan;
mod policy;
mod remote;
mod role;

pub use plan::{
    FieldUpdate, MutationCategory, MutationPlan, RoleCreation, plan_role_convergence,
    plan_role_creation,
};
pub use policy::{
    AttachedPolicy, CANONICAL_POLICY_MARKER, PolicyArn, is_canonical_policy_reference,
};
pub use remote::{RemoteRole, RemoteRoleState, RoleStatus};
pub use role::{
    DEFAULT_MAX_SESSION_DURATION_SECONDS, DEFAULT_ROLE_PATH, InlinePolicy,
    MAX_SESSION_DURATION_UPPER_BOUND_SECONDS, RoleName, RoleSpec, RoleSpecInput,
};
