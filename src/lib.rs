//! Machine health checking for Kubernetes clusters
//!
//! Watches Machines and the Nodes they provision, evaluates them against
//! MachineHealthCheck policies and remediates the ones that stay unhealthy past
//! their timeouts: worker machines are replaced, control-plane machines rebooted.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod rest_api;

pub use error::{Error, Result};
