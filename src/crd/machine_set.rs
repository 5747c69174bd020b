//! MachineSet Custom Resource
//!
//! A MachineSet keeps a number of Machines running from a template. The health checker
//! never writes MachineSets; it relies on them to replace deleted workers and reports
//! their replica counts in the inventory metrics.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "MachineSet",
    namespaced,
    status = "MachineSetStatus",
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    /// Desired number of machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_policy: Option<String>,

    /// Label selector over the machines this set owns
    #[serde(default)]
    #[schemars(with = "serde_json::Value")]
    pub selector: LabelSelector,

    /// Machine template, opaque to the health checker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    /// Most recently observed number of replicas
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub fully_labeled_replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub available_replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MachineSet {
    /// Observed replica counts, zero when the set has no status yet
    pub fn replica_status(&self) -> MachineSetStatus {
        self.status.clone().unwrap_or_default()
    }
}
