//! Health evaluation for machine/node targets
//!
//! Decides whether a target is unhealthy and, when it is not, how long until it
//! must be looked at again. The decision follows a fixed precedence:
//!
//! - **Failed machines** are unhealthy regardless of their node
//! - **Machines without a node** get a grace period to acquire one
//! - **Dangling node references** are unhealthy
//! - **Present nodes** are unhealthy once a matching condition outlives its timeout
//!
//! # Health Verdict
//!
//! Returns [`HealthVerdict`] containing:
//! - `unhealthy` - Whether the target needs remediation
//! - `recheck_after` - Delay until the verdict could change (zero when nothing is pending)
//! - `reason` - Human-readable explanation

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::debug;

use super::targets::{Target, TargetNode};
use crate::crd::{last_transition, NodeExt, NODE_ACQUISITION_GRACE_PERIOD};
use crate::error::Result;

/// Result of evaluating one target
///
/// The verdict is typically created using helper methods:
/// - [`HealthVerdict::healthy`] - Nothing pending, no recheck needed
/// - [`HealthVerdict::pending`] - Healthy for now, recheck after a delay
/// - [`HealthVerdict::unhealthy`] - Remediation required
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthVerdict {
    /// Whether the target needs remediation
    pub unhealthy: bool,

    /// Delay until the verdict could change
    pub recheck_after: Duration,

    /// Human-readable reason
    pub reason: String,
}

impl HealthVerdict {
    /// Create a healthy result with nothing pending
    pub fn healthy() -> Self {
        Self {
            unhealthy: false,
            recheck_after: Duration::ZERO,
            reason: "No unhealthy condition is present".to_string(),
        }
    }

    /// Create a healthy result that must be rechecked after `delay`
    pub fn pending(delay: Duration, reason: String) -> Self {
        Self {
            unhealthy: false,
            recheck_after: delay,
            reason,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(reason: String) -> Self {
        Self {
            unhealthy: true,
            recheck_after: Duration::ZERO,
            reason,
        }
    }
}

/// Time elapsed since `since`, clamped at zero for timestamps in the future
fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Evaluate a target at `now`.
///
/// Fails only when one of the policy's timeouts cannot be parsed, and only for
/// targets whose node is present.
pub fn evaluate(target: &Target<'_>, now: DateTime<Utc>) -> Result<HealthVerdict> {
    let machine = target.machine.name_any();

    if target
        .machine
        .phase()
        .is_some_and(|phase| phase.is_terminal_failure())
    {
        return Ok(HealthVerdict::unhealthy(format!(
            "Machine {} is in a failed phase",
            machine
        )));
    }

    let node = match &target.node {
        TargetNode::Absent => return Ok(evaluate_without_node(target, now)),
        TargetNode::Missing(name) => {
            return Ok(HealthVerdict::unhealthy(format!(
                "Node {} referenced by machine {} does not exist",
                name, machine
            )));
        }
        TargetNode::Present(node) => node,
    };

    let rules = target
        .policy
        .spec
        .unhealthy_conditions
        .iter()
        .map(|rule| rule.timeout().map(|timeout| (rule, timeout)))
        .collect::<Result<Vec<_>>>()?;

    let mut next_check: Option<Duration> = None;
    for (rule, timeout) in rules {
        let Some(condition) = node.condition(&rule.type_) else {
            continue;
        };
        if condition.status != rule.status {
            continue;
        }

        let held_for = match last_transition(condition) {
            Some(since) => elapsed_since(since, now),
            None => Duration::MAX,
        };
        if held_for >= timeout {
            return Ok(HealthVerdict::unhealthy(format!(
                "Node {} has condition {}={} for longer than {:?}",
                node.name_any(),
                rule.type_,
                rule.status,
                timeout
            )));
        }

        let remaining = timeout - held_for;
        debug!(
            machine = %machine,
            condition = %rule.type_,
            status = %rule.status,
            ?remaining,
            "condition pending timeout"
        );
        next_check = Some(next_check.map_or(remaining, |current| current.min(remaining)));
    }

    Ok(match next_check {
        Some(delay) => HealthVerdict::pending(
            delay,
            format!("Node {} has a condition pending its timeout", node.name_any()),
        ),
        None => HealthVerdict::healthy(),
    })
}

fn evaluate_without_node(target: &Target<'_>, now: DateTime<Utc>) -> HealthVerdict {
    let machine = target.machine.name_any();
    let Some(last_updated) = target.machine.last_updated() else {
        return HealthVerdict::pending(
            NODE_ACQUISITION_GRACE_PERIOD,
            format!("Machine {} has no node yet", machine),
        );
    };

    let waited = elapsed_since(last_updated, now);
    if waited >= NODE_ACQUISITION_GRACE_PERIOD {
        HealthVerdict::unhealthy(format!(
            "Machine {} has not acquired a node within {:?}",
            machine, NODE_ACQUISITION_GRACE_PERIOD
        ))
    } else {
        HealthVerdict::pending(
            NODE_ACQUISITION_GRACE_PERIOD - waited,
            format!("Machine {} is waiting for a node", machine),
        )
    }
}
