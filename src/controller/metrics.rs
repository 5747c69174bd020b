//! Prometheus metrics for the machine health operator
//!
//! All metrics live on one [`Metrics`] instance that owns its registry. It is built
//! at startup and shared with the controller and the HTTP server.

use std::sync::atomic::AtomicI64;

use kube::{Resource, ResourceExt};
use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tracing::warn;

use super::store::Store;
use crate::crd::{Machine, MachineSet, Selector};
use crate::error::{Error, Result};

/// Labels identifying a health check policy
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PolicyLabels {
    pub namespace: String,
    pub policy: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RemediationLabels {
    pub namespace: String,
    pub policy: String,
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MachineLabels {
    pub name: String,
    pub namespace: String,
    pub spec_provider_id: String,
    pub node: String,
    pub api_version: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MachineSetLabels {
    pub name: String,
    pub namespace: String,
    pub api_version: String,
}

/// Name and namespace of an inventoried object
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ObjectLabels {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ScrapeLabels {
    pub kind: String,
}

#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    remediations: Family<RemediationLabels, Counter>,
    targets: Family<PolicyLabels, Gauge<i64, AtomicI64>>,
    unhealthy_targets: Family<PolicyLabels, Gauge<i64, AtomicI64>>,
    reconcile_errors: Family<PolicyLabels, Counter>,
    machine_items: Gauge<i64, AtomicI64>,
    machine_created: Family<MachineLabels, Gauge<i64, AtomicI64>>,
    machine_set_items: Gauge<i64, AtomicI64>,
    machine_set_created: Family<MachineSetLabels, Gauge<i64, AtomicI64>>,
    machine_set_available: Family<ObjectLabels, Gauge<i64, AtomicI64>>,
    machine_set_ready: Family<ObjectLabels, Gauge<i64, AtomicI64>>,
    machine_set_replicas: Family<ObjectLabels, Gauge<i64, AtomicI64>>,
    scrape_failures: Family<ScrapeLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let remediations = Family::<RemediationLabels, Counter>::default();
        let targets = Family::<PolicyLabels, Gauge<i64, AtomicI64>>::default();
        let unhealthy_targets = Family::<PolicyLabels, Gauge<i64, AtomicI64>>::default();
        let reconcile_errors = Family::<PolicyLabels, Counter>::default();
        let machine_items = Gauge::<i64, AtomicI64>::default();
        let machine_created = Family::<MachineLabels, Gauge<i64, AtomicI64>>::default();
        let machine_set_items = Gauge::<i64, AtomicI64>::default();
        let machine_set_created = Family::<MachineSetLabels, Gauge<i64, AtomicI64>>::default();
        let machine_set_available = Family::<ObjectLabels, Gauge<i64, AtomicI64>>::default();
        let machine_set_ready = Family::<ObjectLabels, Gauge<i64, AtomicI64>>::default();
        let machine_set_replicas = Family::<ObjectLabels, Gauge<i64, AtomicI64>>::default();
        let scrape_failures = Family::<ScrapeLabels, Counter>::default();

        registry.register(
            "mhc_remediations",
            "Remediation decisions taken for unhealthy machines",
            remediations.clone(),
        );
        registry.register(
            "mhc_targets",
            "Machines selected by a health check policy in its last pass",
            targets.clone(),
        );
        registry.register(
            "mhc_unhealthy_targets",
            "Machines found unhealthy by a health check policy in its last pass",
            unhealthy_targets.clone(),
        );
        registry.register(
            "mhc_reconcile_errors",
            "Failed reconcile passes per health check policy",
            reconcile_errors.clone(),
        );
        registry.register(
            "mapi_machine_items_count",
            "Count of machine objects currently at the apiserver",
            machine_items.clone(),
        );
        registry.register(
            "mapi_machine_created",
            "Creation timestamp of each machine in seconds since the epoch",
            machine_created.clone(),
        );
        registry.register(
            "mapi_machineset_items_count",
            "Count of machinesets at the apiserver",
            machine_set_items.clone(),
        );
        registry.register(
            "mapi_machineset_created",
            "Creation timestamp of each machineset in seconds since the epoch",
            machine_set_created.clone(),
        );
        registry.register(
            "mapi_machine_set_status_available_replicas",
            "Available replicas reported in each machineset's status",
            machine_set_available.clone(),
        );
        registry.register(
            "mapi_machine_set_status_ready_replicas",
            "Ready replicas reported in each machineset's status",
            machine_set_ready.clone(),
        );
        registry.register(
            "mapi_machine_set_status_replicas",
            "Replicas reported in each machineset's status",
            machine_set_replicas.clone(),
        );
        registry.register(
            "mapi_scrape_failure",
            "Failures listing objects while collecting inventory metrics",
            scrape_failures.clone(),
        );

        Self {
            registry,
            remediations,
            targets,
            unhealthy_targets,
            reconcile_errors,
            machine_items,
            machine_created,
            machine_set_items,
            machine_set_created,
            machine_set_available,
            machine_set_ready,
            machine_set_replicas,
            scrape_failures,
        }
    }

    /// Record the size of a completed pass
    pub fn record_pass(&self, namespace: &str, policy: &str, targets: usize, unhealthy: usize) {
        let labels = PolicyLabels {
            namespace: namespace.to_string(),
            policy: policy.to_string(),
        };
        self.targets.get_or_create(&labels).set(targets as i64);
        self.unhealthy_targets.get_or_create(&labels).set(unhealthy as i64);
    }

    pub fn record_remediation(&self, namespace: &str, policy: &str, action: &str) {
        self.remediations
            .get_or_create(&RemediationLabels {
                namespace: namespace.to_string(),
                policy: policy.to_string(),
                action: action.to_string(),
            })
            .inc();
    }

    pub fn record_error(&self, namespace: &str, policy: &str) {
        self.reconcile_errors
            .get_or_create(&PolicyLabels {
                namespace: namespace.to_string(),
                policy: policy.to_string(),
            })
            .inc();
    }

    /// Rebuild the Machine and MachineSet inventory from the store.
    ///
    /// Each kind is listed independently. A failed listing is counted and that
    /// kind's previous inventory is kept.
    pub async fn refresh_inventory(&self, store: &Store, namespace: Option<&str>) {
        self.refresh_machines(store, namespace).await;
        self.refresh_machine_sets(store, namespace).await;
    }

    fn scrape_failed(&self, kind: &str) {
        self.scrape_failures
            .get_or_create(&ScrapeLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    async fn refresh_machines(&self, store: &Store, namespace: Option<&str>) {
        let machines = match store.machines.list(namespace, &Selector::everything()).await {
            Ok(machines) => machines,
            Err(e) => {
                warn!(error = %e, "failed to list machines for metrics");
                self.scrape_failed("mapi_machine_items");
                return;
            }
        };

        self.machine_items.set(machines.len() as i64);
        self.machine_created.clear();
        let api_version = Machine::api_version(&()).to_string();
        for machine in &machines {
            let Some(created) = machine.creation_timestamp() else {
                continue;
            };
            let labels = MachineLabels {
                name: machine.name_any(),
                namespace: machine.namespace().unwrap_or_default(),
                spec_provider_id: machine.spec.provider_id.clone().unwrap_or_default(),
                node: machine.node_name().unwrap_or_default().to_string(),
                api_version: api_version.clone(),
            };
            self.machine_created
                .get_or_create(&labels)
                .set(created.0.timestamp());
        }
    }

    async fn refresh_machine_sets(&self, store: &Store, namespace: Option<&str>) {
        let machine_sets = match store
            .machine_sets
            .list(namespace, &Selector::everything())
            .await
        {
            Ok(machine_sets) => machine_sets,
            Err(e) => {
                warn!(error = %e, "failed to list machinesets for metrics");
                self.scrape_failed("mapi_machineset_items");
                return;
            }
        };

        self.machine_set_items.set(machine_sets.len() as i64);
        self.machine_set_created.clear();
        self.machine_set_available.clear();
        self.machine_set_ready.clear();
        self.machine_set_replicas.clear();
        let api_version = MachineSet::api_version(&()).to_string();
        for machine_set in &machine_sets {
            let name = machine_set.name_any();
            let namespace = machine_set.namespace().unwrap_or_default();
            if let Some(created) = machine_set.creation_timestamp() {
                self.machine_set_created
                    .get_or_create(&MachineSetLabels {
                        name: name.clone(),
                        namespace: namespace.clone(),
                        api_version: api_version.clone(),
                    })
                    .set(created.0.timestamp());
            }

            let status = machine_set.replica_status();
            let labels = ObjectLabels { name, namespace };
            self.machine_set_available
                .get_or_create(&labels)
                .set(status.available_replicas.into());
            self.machine_set_ready
                .get_or_create(&labels)
                .set(status.ready_replicas.into());
            self.machine_set_replicas
                .get_or_create(&labels)
                .set(status.replicas.into());
        }
    }

    /// Render all metrics in the OpenMetrics text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)
            .map_err(|e| Error::MetricsError(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::memory::MemoryStore;
    use crate::controller::store::Repository;
    use crate::controller::testing::*;
    use crate::crd::NamespacedName;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use std::sync::Arc;

    struct UnavailableRepository;

    fn unavailable() -> Error {
        Error::KubeError(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "service unavailable".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        }))
    }

    #[async_trait]
    impl Repository<MachineSet> for UnavailableRepository {
        async fn get(&self, _key: &NamespacedName) -> Result<Option<MachineSet>> {
            Err(unavailable())
        }

        async fn list(
            &self,
            _namespace: Option<&str>,
            _selector: &Selector,
        ) -> Result<Vec<MachineSet>> {
            Err(unavailable())
        }

        async fn replace(&self, _obj: &MachineSet) -> Result<MachineSet> {
            Err(unavailable())
        }

        async fn delete(&self, _key: &NamespacedName) -> Result<()> {
            Err(unavailable())
        }
    }

    #[test]
    fn test_encodes_pass_and_remediation_metrics() {
        let metrics = Metrics::new();
        metrics.record_pass("ns", "workers", 3, 1);
        metrics.record_remediation("ns", "workers", "replace");
        metrics.record_remediation("ns", "workers", "replace");
        metrics.record_error("ns", "workers");

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"mhc_targets{namespace="ns",policy="workers"} 3"#));
        assert!(text.contains(r#"mhc_unhealthy_targets{namespace="ns",policy="workers"} 1"#));
        assert!(text.contains(
            r#"mhc_remediations_total{namespace="ns",policy="workers",action="replace"} 2"#
        ));
        assert!(text.contains(r#"mhc_reconcile_errors_total{namespace="ns",policy="workers"} 1"#));
    }

    fn created_at(secs: i64) -> Option<Time> {
        Some(Time(Utc.timestamp_opt(secs, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_refresh_inventory_reports_machines() {
        let mut w1 = machine("ns", "w1", &[], Some("node-w1"));
        w1.metadata.creation_timestamp = created_at(1_700_000_000);
        w1.spec.provider_id = Some("aws:///us-east-1a/i-0123".to_string());
        let w2 = machine("ns", "w2", &[], None);
        let memory = MemoryStore::new([], [w1, w2], []);

        let metrics = Metrics::new();
        metrics.refresh_inventory(&memory.store(), None).await;

        let text = metrics.encode().unwrap();
        assert!(text.contains("mapi_machine_items_count 2"));
        assert!(text.contains(
            r#"mapi_machine_created{name="w1",namespace="ns",spec_provider_id="aws:///us-east-1a/i-0123",node="node-w1",api_version="machine.openshift.io/v1beta1"} 1700000000"#
        ));
        assert!(text.contains("mapi_machineset_items_count 0"));
    }

    #[tokio::test]
    async fn test_refresh_inventory_reports_machine_sets() {
        let mut workers = machine_set("ns", "workers-a", 3, 2, 1);
        workers.metadata.creation_timestamp = created_at(1_700_000_100);
        let empty = machine_set("ns", "workers-b", 0, 0, 0);
        let memory = MemoryStore::new([], [], []).with_machine_sets([workers, empty]);

        let metrics = Metrics::new();
        metrics.refresh_inventory(&memory.store(), Some("ns")).await;

        let text = metrics.encode().unwrap();
        assert!(text.contains("mapi_machineset_items_count 2"));
        assert!(text.contains(
            r#"mapi_machineset_created{name="workers-a",namespace="ns",api_version="machine.openshift.io/v1beta1"} 1700000100"#
        ));
        assert!(text.contains(
            r#"mapi_machine_set_status_available_replicas{name="workers-a",namespace="ns"} 1"#
        ));
        assert!(text.contains(
            r#"mapi_machine_set_status_ready_replicas{name="workers-a",namespace="ns"} 2"#
        ));
        assert!(text.contains(
            r#"mapi_machine_set_status_replicas{name="workers-a",namespace="ns"} 3"#
        ));
        assert!(text.contains(
            r#"mapi_machine_set_status_replicas{name="workers-b",namespace="ns"} 0"#
        ));
        assert!(!text.contains(r#"mapi_machineset_created{name="workers-b""#));
    }

    #[tokio::test]
    async fn test_failed_machine_set_listing_keeps_machine_inventory() {
        let memory = MemoryStore::new([], [machine("ns", "w1", &[], None)], []);
        let store = Store {
            machine_sets: Arc::new(UnavailableRepository),
            ..memory.store()
        };

        let metrics = Metrics::new();
        metrics.refresh_inventory(&store, None).await;

        let text = metrics.encode().unwrap();
        assert!(text.contains("mapi_machine_items_count 1"));
        assert!(text.contains(r#"mapi_scrape_failure_total{kind="mapi_machineset_items"} 1"#));
        assert!(!text.contains(r#"kind="mapi_machine_items""#));
    }
}
