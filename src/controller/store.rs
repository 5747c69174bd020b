//! Typed access to the cluster object store
//!
//! Each resource kind gets a [`Repository`] parameterized by its type, so the
//! controller never handles dynamic objects. [`KubeRepository`] talks to the API
//! server; tests use the in-memory implementation in `memory`.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::crd::{Machine, MachineHealthCheck, MachineSet, NamespacedName, Selector};
use crate::error::{Error, Result};

/// Typed get/list/replace/delete over one resource kind
#[async_trait]
pub trait Repository<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetch one object, `None` when it does not exist
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>>;

    /// List objects, optionally restricted to a namespace and a label selector
    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>>;

    /// Write back a modified object. Fails with `Error::Conflict` when the stored
    /// resource version no longer matches.
    async fn replace(&self, obj: &K) -> Result<K>;

    /// Delete an object. Fails with `Error::NotFound` when it is already gone.
    async fn delete(&self, key: &NamespacedName) -> Result<()>;
}

/// Resource kinds the health checker stores, with their API scoping
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Api handle for a namespace, or the cluster when `None`
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

impl StoreObject for MachineHealthCheck {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl StoreObject for Machine {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl StoreObject for MachineSet {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl StoreObject for Node {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// Repository backed by the Kubernetes API server
pub struct KubeRepository<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeRepository<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K: StoreObject> Repository<K> for KubeRepository<K> {
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>> {
        let api = K::api(self.client.clone(), key.namespace.as_deref());
        api.get_opt(&key.name)
            .await
            .map_err(|e| Error::from_kube(e, &K::kind(&()), key.namespace.as_deref(), &key.name))
    }

    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>> {
        let api = K::api(self.client.clone(), namespace);
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector.to_string())
        };
        debug!(kind = %K::kind(&()), ?namespace, %selector, "listing objects");
        let list = api.list(&params).await.map_err(Error::KubeError)?;
        Ok(list.items)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let namespace = obj.namespace();
        let api = K::api(self.client.clone(), namespace.as_deref());
        api.replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube(e, &K::kind(&()), namespace.as_deref(), &name))
    }

    async fn delete(&self, key: &NamespacedName) -> Result<()> {
        let api = K::api(self.client.clone(), key.namespace.as_deref());
        api.delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(e, &K::kind(&()), key.namespace.as_deref(), &key.name))
    }
}

/// The repositories the health checker works against
#[derive(Clone)]
pub struct Store {
    pub policies: Arc<dyn Repository<MachineHealthCheck>>,
    pub machines: Arc<dyn Repository<Machine>>,
    pub machine_sets: Arc<dyn Repository<MachineSet>>,
    pub nodes: Arc<dyn Repository<Node>>,
}

impl Store {
    /// Store backed by the API server
    pub fn kube(client: Client) -> Self {
        Self {
            policies: Arc::new(KubeRepository::<MachineHealthCheck>::new(client.clone())),
            machines: Arc::new(KubeRepository::<Machine>::new(client.clone())),
            machine_sets: Arc::new(KubeRepository::<MachineSet>::new(client.clone())),
            nodes: Arc::new(KubeRepository::<Node>::new(client)),
        }
    }
}
