//! MachineHealthCheck Custom Resource Definition
//!
//! A MachineHealthCheck selects Machines by label and lists the node conditions that,
//! once they have persisted past their timeout, make a Machine unhealthy.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::selector::Selector;
use super::types::UnhealthyCondition;
use crate::error::Result;

/// The MachineHealthCheck CRD.
///
/// # Example
///
/// ```yaml
/// apiVersion: healthchecking.openshift.io/v1alpha1
/// kind: MachineHealthCheck
/// metadata:
///   name: workers
///   namespace: openshift-machine-api
/// spec:
///   selector:
///     matchLabels:
///       machine.openshift.io/cluster-api-machine-role: worker
///   unhealthyConditions:
///     - type: Ready
///       status: "False"
///       timeout: 300s
///     - type: Ready
///       status: Unknown
///       timeout: 300s
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "healthchecking.openshift.io",
    version = "v1alpha1",
    kind = "MachineHealthCheck",
    namespaced,
    shortname = "mhc",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineHealthCheckSpec {
    /// Label selector over Machines in the same namespace
    #[schemars(with = "serde_json::Value")]
    pub selector: LabelSelector,

    /// Conditions that mark a node unhealthy once held past their timeout
    #[serde(default)]
    pub unhealthy_conditions: Vec<UnhealthyCondition>,
}

impl MachineHealthCheckSpec {
    /// Typed selector for this policy
    pub fn machine_selector(&self) -> Result<Selector> {
        Selector::try_from(&self.selector)
    }

    /// Check that the selector and every timeout are well formed
    pub fn validate(&self) -> Result<()> {
        self.machine_selector()?;
        for condition in &self.unhealthy_conditions {
            condition.timeout()?;
        }
        Ok(())
    }
}
