//! Maps Machine and Node change events onto the policies that must be reconciled

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{Machine, MachineHealthCheck, NamespacedName, NodeExt};

/// Policies in the machine's namespace whose selector matches its labels
pub fn policies_for_machine<'a>(
    machine: &Machine,
    policies: impl IntoIterator<Item = &'a MachineHealthCheck>,
) -> Vec<NamespacedName> {
    let namespace = machine.namespace();
    policies
        .into_iter()
        .filter(|policy| policy.namespace() == namespace)
        .filter(|policy| match policy.spec.machine_selector() {
            Ok(selector) => selector.matches(machine.metadata.labels.as_ref()),
            Err(e) => {
                debug!(policy = %policy.name_any(), error = %e, "ignoring policy with invalid selector");
                false
            }
        })
        .map(NamespacedName::of)
        .collect()
}

/// Policies interested in a node, found through the machine it is annotated with.
///
/// `lookup_machine` resolves the annotation to the cached Machine. Nodes with no
/// annotation, a malformed one, or one naming an unknown Machine route nowhere.
pub fn policies_for_node<'a, F>(
    node: &Node,
    lookup_machine: F,
    policies: impl IntoIterator<Item = &'a MachineHealthCheck>,
) -> Vec<NamespacedName>
where
    F: FnOnce(&NamespacedName) -> Option<Machine>,
{
    let key = match node.machine_ref() {
        Ok(Some(key)) => key,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(node = %node.name_any(), error = %e, "node has a malformed machine annotation");
            return Vec::new();
        }
    };
    match lookup_machine(&key) {
        Some(machine) => policies_for_machine(&machine, policies),
        None => {
            debug!(node = %node.name_any(), machine = %key, "annotated machine is not known");
            Vec::new()
        }
    }
}
