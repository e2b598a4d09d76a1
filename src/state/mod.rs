//! The `State` handle handed to every reconciler and action.
//!
//! Reads go through [`ObjectStore`], which in production serves `get`/`list`
//! from reflector caches and sends writes straight to the API server. Objects
//! returned from a store are owned clones, so callers may mutate them freely
//! before writing them back.

mod kube_store;
#[cfg(test)]
pub mod testing;

pub(crate) use kube_store::api;
pub use kube_store::{Caches, KubeStore};

use crate::crd::{CassandraCluster, ElasticsearchCluster, Pilot};
use crate::error::Result;
use crate::events::EventPublisher;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Bounds shared by every namespaced type the controller reads or writes.
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed read/write access to one resource kind.
#[async_trait]
pub trait ObjectStore<K: KubeObject>: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Objects in `namespace` whose labels contain every selector entry.
    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<K>>;

    /// Fails with `Error::AlreadyExists` if the name is taken.
    async fn create(&self, namespace: &str, obj: &K) -> Result<K>;

    async fn update(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Write only the status subresource.
    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Deleting an absent object succeeds.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Read view, write client and event recorder for one reconcile.
#[derive(Clone)]
pub struct State {
    pub statefulsets: Arc<dyn ObjectStore<StatefulSet>>,
    pub pods: Arc<dyn ObjectStore<Pod>>,
    pub services: Arc<dyn ObjectStore<Service>>,
    pub configmaps: Arc<dyn ObjectStore<ConfigMap>>,
    pub service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    pub roles: Arc<dyn ObjectStore<Role>>,
    pub role_bindings: Arc<dyn ObjectStore<RoleBinding>>,
    pub pilots: Arc<dyn ObjectStore<Pilot>>,
    pub elasticsearch_clusters: Arc<dyn ObjectStore<ElasticsearchCluster>>,
    pub cassandra_clusters: Arc<dyn ObjectStore<CassandraCluster>>,
    pub recorder: Arc<dyn EventPublisher>,
}
