//! Custom Resource Definitions for machine health checking
//!
//! This module defines the Machine, MachineSet and MachineHealthCheck resources plus the typed
//! label/annotation protocols shared with Nodes.

mod duration;
mod machine;
mod machine_health_check;
mod machine_set;
mod selector;
mod types;

pub use duration::parse_duration;
pub use machine::{Machine, MachineSpec, MachineStatus, NodeReference};
pub use machine_health_check::{MachineHealthCheck, MachineHealthCheckSpec};
pub use machine_set::{MachineSet, MachineSetSpec, MachineSetStatus};
pub use selector::{Requirement, Selector};
pub use types::*;
