//! Machine Custom Resource
//!
//! A Machine is the cluster's representation of a provisioned compute instance. Only the
//! fields the health checker reads are modelled; the object is never written back, so
//! unknown fields are not at risk.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{has_master_role, MachinePhase, MACHINE_SET_KIND};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".status.nodeRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Cloud provider identifier of the instance
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Provider-specific configuration, opaque to the health checker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_spec: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Node this machine has provisioned, once it joined the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeReference>,

    /// Last time the status was updated by the machine controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Lifecycle phase (Provisioning, Provisioned, Running, Deleting, Failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Reference from a Machine to its Node (an `ObjectReference` on the wire)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl Machine {
    /// Name of the node this machine points at, if any
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .map(|r| r.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn phase(&self) -> Option<MachinePhase> {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(MachinePhase::parse)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.last_updated)
    }

    /// Whether a MachineSet controller owns this machine and will replace it
    pub fn has_machine_set_owner(&self) -> bool {
        self.owner_references()
            .iter()
            .any(|owner| owner.kind == MACHINE_SET_KIND)
    }

    /// Whether the machine's role label marks it as control-plane
    pub fn is_control_plane(&self) -> bool {
        has_master_role(self.labels())
    }
}
