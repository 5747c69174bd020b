//! Controller module for MachineHealthCheck reconciliation
//!
//! This module contains the controller loop, target resolution, health evaluation,
//! remediation and the event routing that maps Machine and Node changes to policies.

mod health;
#[cfg(test)]
pub(crate) mod memory;
pub mod metrics;
mod reconciler;
mod remediation;
mod router;
pub mod store;
mod targets;
#[cfg(test)]
pub(crate) mod testing;

pub use health::{evaluate, HealthVerdict};
pub use metrics::Metrics;
pub use reconciler::{
    inspect_policy, reconcile_policy, run_controller, ControllerState, ReconcileOutcome,
    ReconcilePhase, TargetReport,
};
pub use remediation::{is_control_plane, plan, remediate, RemediationAction};
pub use router::{policies_for_machine, policies_for_node};
pub use store::{KubeRepository, Repository, Store, StoreObject};
pub use targets::{node_for_machine, resolve_targets, Target, TargetNode};
