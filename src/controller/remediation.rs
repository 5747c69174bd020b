//! Remediation of unhealthy targets
//!
//! Control-plane machines are never deleted. They are rebooted in place by
//! annotating their node, which the node agent acts on. Worker machines owned by a
//! MachineSet are deleted so the set provisions a replacement.

use std::fmt;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::store::Store;
use super::targets::Target;
use crate::crd::{NodeExt, REBOOT_ANNOTATION_KEY};
use crate::error::{Error, Result};

/// What remediation does for an unhealthy target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    /// Nothing safe can be done
    Skip(String),
    /// Request an in-place reboot through the node annotation
    Reboot,
    /// Delete the machine so its MachineSet replaces it
    Replace,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::Skip(_) => "skip",
            RemediationAction::Reboot => "reboot",
            RemediationAction::Replace => "replace",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationAction::Skip(reason) => write!(f, "skip ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Whether a target is control-plane, by node label or machine role label
pub fn is_control_plane(target: &Target<'_>) -> bool {
    target.machine.is_control_plane()
        || target
            .node
            .node()
            .is_some_and(|node| node.is_control_plane())
}

/// Decide the remediation for an unhealthy target
pub fn plan(target: &Target<'_>) -> RemediationAction {
    if is_control_plane(target) {
        return match target.node.node() {
            Some(_) => RemediationAction::Reboot,
            None => RemediationAction::Skip(
                "control-plane machine has no node to reboot".to_string(),
            ),
        };
    }
    if !target.machine.has_machine_set_owner() {
        return RemediationAction::Skip("machine is not owned by a MachineSet".to_string());
    }
    RemediationAction::Replace
}

/// Conflicts stay retriable as they are; anything else becomes a remediation failure
fn remediation_failed(step: &str, subject: &str, err: Error) -> Error {
    match err {
        Error::Conflict { .. } => err,
        other => Error::RemediationError(format!("{} {}: {}", step, subject, other)),
    }
}

/// Remediate an unhealthy target.
///
/// Performs at most one store mutation and is idempotent: requesting a reboot that
/// is already requested and deleting a machine that is already gone both succeed
/// without writing.
pub async fn remediate(store: &Store, target: &Target<'_>) -> Result<RemediationAction> {
    let action = plan(target);
    let machine = target.machine_key();

    match &action {
        RemediationAction::Skip(reason) => {
            warn!(%machine, %reason, "skipping remediation");
        }
        RemediationAction::Reboot => {
            // plan only returns Reboot when the node is present
            if let Some(node) = target.node.node() {
                if node.has_reboot_request() {
                    debug!(%machine, node = %node.name_any(), "reboot already requested");
                } else {
                    info!(%machine, node = %node.name_any(), "requesting reboot of control-plane node");
                    let mut updated = node.clone();
                    updated
                        .annotations_mut()
                        .insert(REBOOT_ANNOTATION_KEY.to_string(), String::new());
                    store.nodes.replace(&updated).await.map_err(|e| {
                        remediation_failed("requesting reboot of node", &node.name_any(), e)
                    })?;
                }
            }
        }
        RemediationAction::Replace => {
            info!(%machine, "deleting unhealthy machine");
            match store.machines.delete(&machine).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(%machine, "machine already deleted");
                }
                Err(e) => {
                    return Err(remediation_failed("deleting machine", &machine.to_string(), e))
                }
            }
        }
    }

    Ok(action)
}
