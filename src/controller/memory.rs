//! In-memory repositories for tests
//!
//! Mirrors the API server semantics the controller depends on: label filtering,
//! `NotFound` on deleting a missing object and `Conflict` on replacing with a stale
//! resource version. Every successful write is counted so tests can assert on the
//! number of mutations a reconcile pass performed. [`FailingRepository`] reads through
//! to a memory repository and rejects every write.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{Resource, ResourceExt};
use tokio::sync::RwLock;

use super::store::{Repository, Store};
use crate::crd::{Machine, MachineHealthCheck, MachineSet, NamespacedName, Selector};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct MemoryRepository<K> {
    objects: RwLock<BTreeMap<NamespacedName, K>>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl<K> Default for MemoryRepository<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

impl<K> MemoryRepository<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.objects.try_write().expect("fresh lock");
            for mut obj in objects {
                if obj.meta().resource_version.is_none() {
                    obj.meta_mut().resource_version = Some("1".to_string());
                }
                map.insert(NamespacedName::of(&obj), obj);
            }
        }
        repo
    }

    pub async fn snapshot(&self, key: &NamespacedName) -> Option<K> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K> Repository<K> for MemoryRepository<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace.as_deref() == Some(ns)))
            .filter(|(_, obj)| selector.matches(obj.meta().labels.as_ref()))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let key = NamespacedName::of(obj);
        let mut objects = self.objects.write().await;
        let current = objects.get(&key).ok_or_else(|| Error::NotFound {
            kind: K::kind(&()).to_string(),
            name: key.name.clone(),
            namespace: key.namespace.clone().unwrap_or_default(),
        })?;
        if obj.meta().resource_version.is_some()
            && obj.meta().resource_version != current.meta().resource_version
        {
            return Err(Error::Conflict {
                kind: K::kind(&()).to_string(),
                name: obj.name_any(),
            });
        }

        let next_version = current
            .meta()
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(next_version.to_string());
        objects.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, key: &NamespacedName) -> Result<()> {
        match self.objects.write().await.remove(key) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(Error::NotFound {
                kind: K::kind(&()).to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Repository whose reads hit `inner` and whose writes fail with `fail(key)`
pub struct FailingRepository<K> {
    inner: Arc<MemoryRepository<K>>,
    fail: fn(&NamespacedName) -> Error,
    attempts: AtomicUsize,
}

impl<K> FailingRepository<K> {
    pub fn new(inner: Arc<MemoryRepository<K>>, fail: fn(&NamespacedName) -> Error) -> Self {
        Self {
            inner,
            fail,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Rejected replace and delete calls so far
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reject(&self, key: &NamespacedName) -> Error {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        (self.fail)(key)
    }
}

#[async_trait]
impl<K> Repository<K> for FailingRepository<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>> {
        self.inner.get(key).await
    }

    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>> {
        self.inner.list(namespace, selector).await
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        Err(self.reject(&NamespacedName::of(obj)))
    }

    async fn delete(&self, key: &NamespacedName) -> Result<()> {
        Err(self.reject(key))
    }
}

/// In-memory store plus handles on the concrete repositories for assertions
pub struct MemoryStore {
    pub policies: Arc<MemoryRepository<MachineHealthCheck>>,
    pub machines: Arc<MemoryRepository<Machine>>,
    pub machine_sets: Arc<MemoryRepository<MachineSet>>,
    pub nodes: Arc<MemoryRepository<Node>>,
}

impl MemoryStore {
    pub fn new(
        policies: impl IntoIterator<Item = MachineHealthCheck>,
        machines: impl IntoIterator<Item = Machine>,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Self {
        Self {
            policies: Arc::new(MemoryRepository::with_objects(policies)),
            machines: Arc::new(MemoryRepository::with_objects(machines)),
            machine_sets: Arc::new(MemoryRepository::default()),
            nodes: Arc::new(MemoryRepository::with_objects(nodes)),
        }
    }

    pub fn with_machine_sets(mut self, machine_sets: impl IntoIterator<Item = MachineSet>) -> Self {
        self.machine_sets = Arc::new(MemoryRepository::with_objects(machine_sets));
        self
    }

    pub fn store(&self) -> Store {
        Store {
            policies: self.policies.clone(),
            machines: self.machines.clone(),
            machine_sets: self.machine_sets.clone(),
            nodes: self.nodes.clone(),
        }
    }

    /// Total mutations across all kinds
    pub fn mutation_count(&self) -> usize {
        self.policies.write_count()
            + self.policies.delete_count()
            + self.machines.write_count()
            + self.machines.delete_count()
            + self.machine_sets.write_count()
            + self.machine_sets.delete_count()
            + self.nodes.write_count()
            + self.nodes.delete_count()
    }
}
