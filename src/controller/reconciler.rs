//! Core reconciliation logic for MachineHealthCheck resources
//!
//! A pass resolves the policy's targets, evaluates every one of them, remediates
//! the unhealthy ones and schedules the next pass for when the earliest pending
//! condition could expire. Nothing is persisted between passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        reflector::{self, ObjectRef},
        watcher::{self, Config},
        WatchStreamExt,
    },
    ResourceExt,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::health::{evaluate, HealthVerdict};
use super::metrics::Metrics;
use super::remediation::{plan, remediate, RemediationAction};
use super::router::{policies_for_machine, policies_for_node};
use super::store::{Store, StoreObject};
use super::targets::{resolve_targets, Target};
use crate::config::OperatorConfig;
use crate::crd::{Machine, MachineHealthCheck, NamespacedName};
use crate::error::{Error, Result};

/// Shared state for the controller
pub struct ControllerState {
    pub store: Store,
    pub metrics: Arc<Metrics>,
    pub config: OperatorConfig,
}

/// Stages of a single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Resolving,
    Evaluating,
    Remediating,
    Scheduled,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ReconcilePhase::Resolving => "Resolving",
            ReconcilePhase::Evaluating => "Evaluating",
            ReconcilePhase::Remediating => "Remediating",
            ReconcilePhase::Scheduled => "Scheduled",
        };
        f.write_str(phase)
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// When to run the next pass; `None` waits for the next watch event
    pub requeue_after: Option<Duration>,
    pub targets: usize,
    pub unhealthy: usize,
    /// Remediation taken per unhealthy machine, in target order
    pub remediations: Vec<(NamespacedName, RemediationAction)>,
}

/// Dry-run evaluation of one target
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub machine: String,
    pub node: Option<String>,
    pub unhealthy: bool,
    pub recheck_after_secs: u64,
    pub reason: String,
    /// Action remediation would take, for unhealthy targets
    pub planned_action: Option<String>,
}

/// Run one pass for the policy with the given key
pub async fn reconcile_policy(
    state: &ControllerState,
    key: &NamespacedName,
) -> Result<ReconcileOutcome> {
    reconcile_policy_at(state, key, Utc::now()).await
}

pub(crate) async fn reconcile_policy_at(
    state: &ControllerState,
    key: &NamespacedName,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    let Some(policy) = state.store.policies.get(key).await? else {
        debug!(policy = %key, "policy no longer exists");
        return Ok(ReconcileOutcome::default());
    };
    policy.spec.validate()?;

    debug!(policy = %key, phase = %ReconcilePhase::Resolving);
    let targets = resolve_targets(&state.store, &policy).await?;

    debug!(policy = %key, phase = %ReconcilePhase::Evaluating, targets = targets.len());
    let verdicts = evaluate_all(&targets, now)?;

    let namespace = key.namespace.as_deref().unwrap_or_default();
    let unhealthy = verdicts.iter().filter(|v| v.unhealthy).count();
    state
        .metrics
        .record_pass(namespace, &key.name, targets.len(), unhealthy);

    debug!(policy = %key, phase = %ReconcilePhase::Remediating, unhealthy);
    let mut remediations = Vec::new();
    for (target, verdict) in targets.iter().zip(&verdicts) {
        if !verdict.unhealthy {
            continue;
        }
        info!(
            policy = %key,
            machine = %target.machine_key(),
            reason = %verdict.reason,
            "machine is unhealthy"
        );
        let action = remediate(&state.store, target).await?;
        state
            .metrics
            .record_remediation(namespace, &key.name, action.as_str());
        remediations.push((target.machine_key(), action));
    }

    let requeue_after = next_requeue(&verdicts);
    debug!(policy = %key, phase = %ReconcilePhase::Scheduled, ?requeue_after);

    Ok(ReconcileOutcome {
        requeue_after,
        targets: targets.len(),
        unhealthy,
        remediations,
    })
}

/// Evaluate every target, failing on the first error
fn evaluate_all(targets: &[Target<'_>], now: DateTime<Utc>) -> Result<Vec<HealthVerdict>> {
    targets
        .iter()
        .map(|target| -> Result<HealthVerdict> {
            let verdict = evaluate(target, now)?;
            debug!(
                machine = %target.machine_key(),
                unhealthy = verdict.unhealthy,
                recheck_after = ?verdict.recheck_after,
                reason = %verdict.reason,
                "evaluated target"
            );
            Ok(verdict)
        })
        .collect()
}

/// Smallest non-zero recheck among healthy targets
fn next_requeue(verdicts: &[HealthVerdict]) -> Option<Duration> {
    verdicts
        .iter()
        .filter(|v| !v.unhealthy && !v.recheck_after.is_zero())
        .map(|v| v.recheck_after)
        .min()
}

/// Evaluate a policy's targets without remediating anything
pub async fn inspect_policy(
    store: &Store,
    policy: &MachineHealthCheck,
    now: DateTime<Utc>,
) -> Result<Vec<TargetReport>> {
    let targets = resolve_targets(store, policy).await?;
    let verdicts = evaluate_all(&targets, now)?;
    Ok(targets
        .iter()
        .zip(verdicts)
        .map(|(target, verdict)| TargetReport {
            machine: target.machine_key().to_string(),
            node: target.node.name(),
            unhealthy: verdict.unhealthy,
            recheck_after_secs: verdict.recheck_after.as_secs(),
            planned_action: verdict.unhealthy.then(|| plan(target).to_string()),
            reason: verdict.reason,
        })
        .collect())
}

/// Main entry point to start the controller
pub async fn run_controller(client: Client, state: Arc<ControllerState>) -> Result<()> {
    let namespace = state.config.namespace.clone();
    let policies = MachineHealthCheck::api(client.clone(), namespace.as_deref());
    let machines = Machine::api(client.clone(), namespace.as_deref());
    let nodes: Api<Node> = Api::all(client.clone());

    info!(namespace = ?namespace, "Starting MachineHealthCheck controller");

    // Verify CRD exists
    match policies.list(&Default::default()).await {
        Ok(_) => info!("MachineHealthCheck CRD is available"),
        Err(e) => {
            error!(
                "MachineHealthCheck CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "MachineHealthCheck CRD not installed".to_string(),
            ));
        }
    }

    // Machine cache used to route node events back to their machine
    let (machine_cache, machine_writer) = reflector::store::<Machine>();
    let machine_reflector = reflector::reflector(
        machine_writer,
        watcher::watcher(machines.clone(), Config::default()),
    )
    .default_backoff()
    .applied_objects()
    .for_each(|event| async move {
        if let Err(e) = event {
            warn!("Machine cache watch error: {}", e);
        }
    });
    tokio::spawn(machine_reflector);

    let controller = Controller::new(policies, Config::default());
    let policy_cache = controller.store();
    let node_policy_cache = policy_cache.clone();

    controller
        .watches(machines, Config::default(), move |machine: Machine| {
            let policies = policy_cache.state();
            policies_for_machine(&machine, policies.iter().map(Arc::as_ref))
                .into_iter()
                .map(object_ref)
                .collect::<Vec<_>>()
        })
        .watches(nodes, Config::default(), move |node: Node| {
            let policies = node_policy_cache.state();
            let lookup = |key: &NamespacedName| {
                let mut obj_ref = ObjectRef::<Machine>::new(&key.name);
                if let Some(ns) = &key.namespace {
                    obj_ref = obj_ref.within(ns);
                }
                machine_cache.get(&obj_ref).map(|m| m.as_ref().clone())
            };
            policies_for_node(&node, lookup, policies.iter().map(Arc::as_ref))
                .into_iter()
                .map(object_ref)
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

fn object_ref(key: NamespacedName) -> ObjectRef<MachineHealthCheck> {
    let obj_ref = ObjectRef::new(&key.name);
    match &key.namespace {
        Some(ns) => obj_ref.within(ns),
        None => obj_ref,
    }
}

/// The reconciliation function driven by the controller
///
/// This function is called whenever:
/// - A MachineHealthCheck is created, updated, or deleted
/// - A selected Machine or its Node changes
/// - The requeue timer expires
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MachineHealthCheck>, ctx: Arc<ControllerState>) -> Result<Action> {
    let key = NamespacedName::of(obj.as_ref());
    match reconcile_policy(&ctx, &key).await {
        Ok(outcome) => {
            if !outcome.remediations.is_empty() {
                info!(
                    policy = %key,
                    remediated = outcome.remediations.len(),
                    "Remediated unhealthy machines"
                );
            }
            Ok(match outcome.requeue_after {
                Some(delay) => Action::requeue(delay),
                None => Action::await_change(),
            })
        }
        Err(e) => {
            ctx.metrics
                .record_error(key.namespace.as_deref().unwrap_or_default(), &key.name);
            Err(e)
        }
    }
}

/// Error policy for the controller
fn error_policy(policy: Arc<MachineHealthCheck>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    error!(
        "Reconciliation error for {}: {}",
        policy.name_any(),
        error.status_message()
    );

    // A broken policy will not fix itself
    if error.is_config_error() {
        return Action::await_change();
    }

    let retry_duration = if error.is_retriable() {
        ctx.config.retry_interval()
    } else {
        ctx.config.error_interval()
    };

    Action::requeue(retry_duration)
}
