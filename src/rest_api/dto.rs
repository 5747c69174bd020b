//! Data transfer objects for the REST API

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::controller::TargetReport;
use crate::crd::MachineHealthCheck;

/// One unhealthy condition rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionSummary {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub timeout: String,
}

/// Summary of a health check policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub name: String,
    pub namespace: String,
    /// Selector in label-query form, or the validation error when it is malformed
    pub selector: String,
    pub unhealthy_conditions: Vec<ConditionSummary>,
}

impl From<&MachineHealthCheck> for PolicySummary {
    fn from(policy: &MachineHealthCheck) -> Self {
        let selector = match policy.spec.machine_selector() {
            Ok(selector) => selector.to_string(),
            Err(e) => format!("<invalid: {}>", e),
        };
        Self {
            name: policy.name_any(),
            namespace: policy.namespace().unwrap_or_default(),
            selector,
            unhealthy_conditions: policy
                .spec
                .unhealthy_conditions
                .iter()
                .map(|c| ConditionSummary {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    timeout: c.timeout.clone(),
                })
                .collect(),
        }
    }
}

/// Response for listing policies
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyListResponse {
    pub items: Vec<PolicySummary>,
    pub total: usize,
}

/// Dry-run evaluation of a policy's targets
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsResponse {
    pub policy: String,
    pub namespace: String,
    pub targets: Vec<TargetReport>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
