//! Fixture builders shared by the controller tests

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference, Time};
use kube::api::ObjectMeta;

use crate::crd::{
    Machine, MachineHealthCheck, MachineHealthCheckSpec, MachineSet, MachineSetSpec,
    MachineSetStatus, MachineSpec, MachineStatus, NodeReference, UnhealthyCondition,
    MACHINE_ANNOTATION_KEY, MACHINE_SET_KIND,
};

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn ready_false(timeout: &str) -> UnhealthyCondition {
    UnhealthyCondition {
        type_: "Ready".to_string(),
        status: "False".to_string(),
        timeout: timeout.to_string(),
    }
}

pub fn policy(
    namespace: &str,
    name: &str,
    match_labels: &[(&str, &str)],
    rules: Vec<UnhealthyCondition>,
) -> MachineHealthCheck {
    let mut mhc = MachineHealthCheck::new(
        name,
        MachineHealthCheckSpec {
            selector: LabelSelector {
                match_labels: Some(map(match_labels)),
                match_expressions: None,
            },
            unhealthy_conditions: rules,
        },
    );
    mhc.metadata.namespace = Some(namespace.to_string());
    mhc
}

/// A Machine owned by a MachineSet, optionally pointing at a node
pub fn machine(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    node_name: Option<&str>,
) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(map(labels)),
            owner_references: Some(vec![OwnerReference {
                api_version: "machine.openshift.io/v1beta1".to_string(),
                kind: MACHINE_SET_KIND.to_string(),
                name: format!("{}-set", namespace),
                uid: "machineset-uid".to_string(),
                controller: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        },
        spec: MachineSpec::default(),
        status: Some(MachineStatus {
            node_ref: node_name.map(|n| NodeReference {
                name: n.to_string(),
                kind: Some("Node".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

pub fn without_owner(mut machine: Machine) -> Machine {
    machine.metadata.owner_references = None;
    machine
}

pub fn with_phase(mut machine: Machine, phase: &str) -> Machine {
    machine.status.get_or_insert_with(Default::default).phase = Some(phase.to_string());
    machine
}

pub fn with_last_updated(mut machine: Machine, at: DateTime<Utc>) -> Machine {
    machine.status.get_or_insert_with(Default::default).last_updated = Some(at);
    machine
}

pub fn node(name: &str, labels: &[(&str, &str)], conditions: Vec<NodeCondition>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(map(labels)),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            conditions: Some(conditions),
            ..Default::default()
        }),
    }
}

/// Annotate a node with its owning machine
pub fn owned_by(mut node: Node, machine_ref: &str) -> Node {
    node.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(MACHINE_ANNOTATION_KEY.to_string(), machine_ref.to_string());
    node
}

/// A node condition that last transitioned `seconds_ago` before `now`
pub fn condition(type_: &str, status: &str, now: DateTime<Utc>, seconds_ago: i64) -> NodeCondition {
    NodeCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Time(now - ChronoDuration::seconds(seconds_ago))),
        ..Default::default()
    }
}

/// A MachineSet with observed replicas, ready replicas and available replicas
pub fn machine_set(
    namespace: &str,
    name: &str,
    replicas: i32,
    ready: i32,
    available: i32,
) -> MachineSet {
    MachineSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: MachineSetSpec {
            replicas: Some(replicas),
            ..Default::default()
        },
        status: Some(MachineSetStatus {
            replicas,
            ready_replicas: ready,
            available_replicas: available,
            ..Default::default()
        }),
    }
}
