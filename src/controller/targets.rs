//! Target resolution
//!
//! Pairs every Machine a policy selects with the Node it points at. Targets are
//! rebuilt from the store on every pass and never cached.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{debug, warn};

use super::store::Store;
use crate::crd::{Machine, MachineHealthCheck, NamespacedName};
use crate::error::{Error, Result};

/// Node slot of a target
#[derive(Clone, Debug)]
pub enum TargetNode {
    /// The Machine has not been assigned a Node yet
    Absent,
    /// The Machine references a Node the store does not have
    Missing(String),
    Present(Node),
}

impl TargetNode {
    pub fn node(&self) -> Option<&Node> {
        match self {
            TargetNode::Present(node) => Some(node),
            _ => None,
        }
    }

    /// Name of the referenced node, present or not
    pub fn name(&self) -> Option<String> {
        match self {
            TargetNode::Absent => None,
            TargetNode::Missing(name) => Some(name.clone()),
            TargetNode::Present(node) => Some(node.name_any()),
        }
    }
}

/// A policy applied to one Machine and its Node
#[derive(Clone, Debug)]
pub struct Target<'a> {
    pub policy: &'a MachineHealthCheck,
    pub machine: Machine,
    pub node: TargetNode,
}

impl Target<'_> {
    pub fn machine_key(&self) -> NamespacedName {
        NamespacedName::of(&self.machine)
    }
}

/// Look up the Node a Machine references.
///
/// `Ok(None)` when the Machine has no node reference; `Error::NotFound` when it
/// references a Node the store does not have.
pub async fn node_for_machine(store: &Store, machine: &Machine) -> Result<Option<Node>> {
    let Some(name) = machine.node_name() else {
        return Ok(None);
    };
    match store.nodes.get(&NamespacedName::cluster_scoped(name)).await? {
        Some(node) => Ok(Some(node)),
        None => Err(Error::NotFound {
            kind: "Node".to_string(),
            name: name.to_string(),
            namespace: String::new(),
        }),
    }
}

/// Resolve the policy's targets, in listing order
pub async fn resolve_targets<'a>(
    store: &Store,
    policy: &'a MachineHealthCheck,
) -> Result<Vec<Target<'a>>> {
    let selector = policy.spec.machine_selector()?;
    let namespace = policy.namespace();
    let machines = store.machines.list(namespace.as_deref(), &selector).await?;

    debug!(
        policy = %policy.name_any(),
        %selector,
        count = machines.len(),
        "resolved machines for policy"
    );

    let mut targets = Vec::with_capacity(machines.len());
    for machine in machines {
        let node = match node_for_machine(store, &machine).await {
            Ok(Some(node)) => TargetNode::Present(node),
            Ok(None) => TargetNode::Absent,
            Err(Error::NotFound { name, .. }) => {
                warn!(
                    machine = %machine.name_any(),
                    node = %name,
                    "machine references a node that does not exist"
                );
                TargetNode::Missing(name)
            }
            Err(e) => return Err(e),
        };
        targets.push(Target {
            policy,
            machine,
            node,
        });
    }
    Ok(targets)
}
