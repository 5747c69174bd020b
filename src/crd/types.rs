//! Shared types for machine health checking
//!
//! Label and annotation protocols shared with other cluster components live here as
//! typed accessors so the controller never splits raw strings at call sites.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition};
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::duration::parse_duration;
use crate::error::{Error, Result};

/// Node annotation pointing back at the owning Machine, formatted `<namespace>/<name>`
pub const MACHINE_ANNOTATION_KEY: &str = "machine.openshift.io/machine";

/// Node annotation requesting an in-place reboot of a control-plane machine
pub const REBOOT_ANNOTATION_KEY: &str = "healthchecking.openshift.io/machine-remediation-reboot";

/// Node labels marking control-plane nodes
pub const NODE_MASTER_LABEL: &str = "node-role.kubernetes.io/master";
pub const NODE_CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// Machine label carrying the machine role, and the control-plane role value
pub const MACHINE_ROLE_LABEL: &str = "machine.openshift.io/cluster-api-machine-role";
pub const MACHINE_MASTER_ROLE: &str = "master";

/// Owner kind of the scaling group that replaces deleted machines
pub const MACHINE_SET_KIND: &str = "MachineSet";

/// How long a new Machine may go without a Node before it is unhealthy
pub const NODE_ACQUISITION_GRACE_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Namespace + name identity of a stored object. Cluster-scoped objects have no namespace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: Option<String>,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster_scoped(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Key of any stored resource
    pub fn of<K: kube::Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }

    /// Parse the `<namespace>/<name>` form used by the machine back-reference annotation
    pub fn parse(value: &str) -> Result<Self> {
        match value.split('/').collect::<Vec<_>>().as_slice() {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::InvalidMachineReference(format!(
                "expected <namespace>/<name>, got {:?}",
                value
            ))),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A node condition that, once held for longer than `timeout`, makes the target unhealthy
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct UnhealthyCondition {
    /// Node condition type, e.g. "Ready"
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status that counts as unhealthy: "True", "False" or "Unknown"
    pub status: String,
    /// Duration string, e.g. "300s" or "5m"
    pub timeout: String,
}

impl UnhealthyCondition {
    /// Parse the timeout string into a duration
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout).map_err(|reason| Error::InvalidTimeout {
            condition_type: self.type_.clone(),
            timeout: self.timeout.clone(),
            reason,
        })
    }
}

/// Lifecycle phase reported by a Machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachinePhase {
    Provisioning,
    Provisioned,
    Running,
    Deleting,
    Failed,
    Other(String),
}

impl MachinePhase {
    pub fn parse(value: &str) -> Self {
        match value {
            "Provisioning" => MachinePhase::Provisioning,
            "Provisioned" => MachinePhase::Provisioned,
            "Running" => MachinePhase::Running,
            "Deleting" => MachinePhase::Deleting,
            "Failed" => MachinePhase::Failed,
            other => MachinePhase::Other(other.to_string()),
        }
    }

    /// Terminal failure phases that are unhealthy regardless of node state
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, MachinePhase::Failed)
    }
}

/// Typed accessors for the health-check related parts of a Node
pub trait NodeExt {
    /// The Machine this node claims to belong to, if annotated
    fn machine_ref(&self) -> Result<Option<NamespacedName>>;
    /// Whether the node carries a control-plane marker label
    fn is_control_plane(&self) -> bool;
    /// First condition of the given type
    fn condition(&self, type_: &str) -> Option<&NodeCondition>;
    /// Whether a reboot has already been requested
    fn has_reboot_request(&self) -> bool;
}

impl NodeExt for Node {
    fn machine_ref(&self) -> Result<Option<NamespacedName>> {
        self.annotations()
            .get(MACHINE_ANNOTATION_KEY)
            .map(|value| NamespacedName::parse(value))
            .transpose()
    }

    fn is_control_plane(&self) -> bool {
        let labels = self.labels();
        labels.contains_key(NODE_MASTER_LABEL) || labels.contains_key(NODE_CONTROL_PLANE_LABEL)
    }

    fn condition(&self, type_: &str) -> Option<&NodeCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conditions| conditions.iter().find(|c| c.type_ == type_))
    }

    fn has_reboot_request(&self) -> bool {
        self.annotations().contains_key(REBOOT_ANNOTATION_KEY)
    }
}

/// Time a node condition last changed status
pub fn last_transition(condition: &NodeCondition) -> Option<DateTime<Utc>> {
    condition.last_transition_time.as_ref().map(|t| t.0)
}

/// Whether a label set marks a machine with the control-plane role
pub fn has_master_role(labels: &BTreeMap<String, String>) -> bool {
    labels.get(MACHINE_ROLE_LABEL).map(String::as_str) == Some(MACHINE_MASTER_ROLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NodeStatus;
    use kube::api::ObjectMeta;

    fn node_with(annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("node1".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus::default()),
        }
    }

    #[test]
    fn test_parse_namespaced_name() {
        let key = NamespacedName::parse("openshift-machine-api/worker-0").unwrap();
        assert_eq!(key, NamespacedName::new("openshift-machine-api", "worker-0"));
        assert_eq!(key.to_string(), "openshift-machine-api/worker-0");
    }

    #[test]
    fn test_parse_namespaced_name_rejects_malformed() {
        for bad in ["worker-0", "/worker-0", "ns/", "a/b/c", ""] {
            let err = NamespacedName::parse(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidMachineReference(_)), "{bad}");
        }
    }

    #[test]
    fn test_node_machine_ref() {
        let annotated = node_with(&[(MACHINE_ANNOTATION_KEY, "ns/m1")], &[]);
        assert_eq!(
            annotated.machine_ref().unwrap(),
            Some(NamespacedName::new("ns", "m1"))
        );

        let bare = node_with(&[], &[]);
        assert_eq!(bare.machine_ref().unwrap(), None);

        let malformed = node_with(&[(MACHINE_ANNOTATION_KEY, "m1")], &[]);
        assert!(malformed.machine_ref().is_err());
    }

    #[test]
    fn test_node_control_plane_labels() {
        assert!(node_with(&[], &[(NODE_MASTER_LABEL, "")]).is_control_plane());
        assert!(node_with(&[], &[(NODE_CONTROL_PLANE_LABEL, "")]).is_control_plane());
        assert!(!node_with(&[], &[("node-role.kubernetes.io/worker", "")]).is_control_plane());
    }

    #[test]
    fn test_unhealthy_condition_timeout() {
        let rule = UnhealthyCondition {
            type_: "Ready".to_string(),
            status: "False".to_string(),
            timeout: "300s".to_string(),
        };
        assert_eq!(rule.timeout().unwrap(), Duration::from_secs(300));

        let bad = UnhealthyCondition {
            timeout: "badTimeout".to_string(),
            ..rule
        };
        assert!(bad.timeout().unwrap_err().is_config_error());
    }

    #[test]
    fn test_machine_phase() {
        assert!(MachinePhase::parse("Failed").is_terminal_failure());
        assert!(!MachinePhase::parse("Running").is_terminal_failure());
        assert_eq!(
            MachinePhase::parse("Weird"),
            MachinePhase::Other("Weird".to_string())
        );
    }

    #[test]
    fn test_master_role() {
        let mut labels = BTreeMap::new();
        assert!(!has_master_role(&labels));
        labels.insert(MACHINE_ROLE_LABEL.to_string(), "worker".to_string());
        assert!(!has_master_role(&labels));
        labels.insert(MACHINE_ROLE_LABEL.to_string(), MACHINE_MASTER_ROLE.to_string());
        assert!(has_master_role(&labels));
    }
}
