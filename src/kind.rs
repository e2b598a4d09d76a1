//! What the shared reconcilers and actions need to know about a database kind.

use crate::builders;
use crate::crd::{CassandraCluster, ElasticsearchCluster, Health, ImageSpec, Pilot};
use crate::error::{Error, Result};
use crate::labels::{
    APP_LABEL, CASSANDRA_CLUSTER_LABEL, CASSANDRA_NODE_POOL_LABEL, ELASTICSEARCH_CLUSTER_LABEL,
    ELASTICSEARCH_NODE_POOL_LABEL, PILOTED_LABEL,
};
use crate::state::{KubeObject, ObjectStore, State};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a replica proves it holds no data before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Nothing to hand off; shrink immediately.
    None,
    /// Pilot reports zero documents.
    Documents,
    /// Pilot acknowledged a decommission request.
    Decommission,
}

pub trait ClusterKind: KubeObject {
    /// Prefix for every generated object name
    const PREFIX: &'static str;
    /// Value of the `app` label
    const APP: &'static str;
    const CLUSTER_LABEL: &'static str;
    const NODE_POOL_LABEL: &'static str;

    fn version(&self) -> &str;

    fn image(&self) -> &ImageSpec;

    fn node_pool_names(&self) -> Vec<String>;

    /// Desired replicas of `pool`, if the pool is still in the spec.
    fn node_pool_replicas(&self, pool: &str) -> Option<i32>;

    fn drain_policy(&self, pool: &str) -> DrainPolicy;

    /// Version the pilot sidecar reports for its replica.
    fn pilot_version(pilot: &Pilot) -> Option<&str>;

    /// Aggregate health, when the kind tracks one.
    fn health(&self) -> Option<Health>;

    fn store(state: &State) -> &Arc<dyn ObjectStore<Self>>;

    /// Desired StatefulSet realising `pool`.
    fn statefulset(&self, pool: &str) -> Result<StatefulSet>;

    fn services(&self) -> Vec<Service>;

    /// Image reference the database container should run.
    fn target_image(&self) -> String {
        self.image().reference(self.version())
    }

    /// Base name shared by the cluster's ServiceAccount, Role and Services.
    fn resource_name(&self) -> String {
        format!("{}-{}", Self::PREFIX, self.name_any())
    }

    fn statefulset_name(&self, pool: &str) -> String {
        format!("{}-{}-{}", Self::PREFIX, self.name_any(), pool)
    }

    fn cluster_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), Self::APP.to_string()),
            (Self::CLUSTER_LABEL.to_string(), self.name_any()),
        ])
    }

    fn node_pool_labels(&self, pool: &str) -> BTreeMap<String, String> {
        let mut labels = self.cluster_labels();
        labels.insert(Self::NODE_POOL_LABEL.to_string(), pool.to_string());
        labels
    }

    /// Labels stamped on pod templates; the pilot marker scopes the pod cache.
    fn pod_labels(&self, pool: &str) -> BTreeMap<String, String> {
        let mut labels = self.node_pool_labels(pool);
        labels.insert(PILOTED_LABEL.to_string(), "true".to_string());
        labels
    }
}

impl ClusterKind for ElasticsearchCluster {
    const PREFIX: &'static str = "es";
    const APP: &'static str = "elasticsearch";
    const CLUSTER_LABEL: &'static str = ELASTICSEARCH_CLUSTER_LABEL;
    const NODE_POOL_LABEL: &'static str = ELASTICSEARCH_NODE_POOL_LABEL;

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn image(&self) -> &ImageSpec {
        &self.spec.image
    }

    fn node_pool_names(&self) -> Vec<String> {
        self.spec.node_pools.iter().map(|p| p.name.clone()).collect()
    }

    fn node_pool_replicas(&self, pool: &str) -> Option<i32> {
        self.spec
            .node_pools
            .iter()
            .find(|p| p.name == pool)
            .map(|p| p.replicas)
    }

    fn drain_policy(&self, pool: &str) -> DrainPolicy {
        match self.spec.node_pools.iter().find(|p| p.name == pool) {
            Some(p) if p.is_data_bearing() => DrainPolicy::Documents,
            _ => DrainPolicy::None,
        }
    }

    fn pilot_version(pilot: &Pilot) -> Option<&str> {
        pilot.elasticsearch_status()?.version.as_deref()
    }

    fn health(&self) -> Option<Health> {
        self.status.as_ref().and_then(|s| s.health)
    }

    fn store(state: &State) -> &Arc<dyn ObjectStore<Self>> {
        &state.elasticsearch_clusters
    }

    fn statefulset(&self, pool: &str) -> Result<StatefulSet> {
        let spec = self
            .spec
            .node_pools
            .iter()
            .find(|p| p.name == pool)
            .ok_or_else(|| Error::invalid(format!("unknown node pool {pool}")))?;
        builders::elasticsearch::statefulset(self, spec)
    }

    fn services(&self) -> Vec<Service> {
        builders::elasticsearch::services(self)
    }
}

impl ClusterKind for CassandraCluster {
    const PREFIX: &'static str = "cass";
    const APP: &'static str = "cassandra";
    const CLUSTER_LABEL: &'static str = CASSANDRA_CLUSTER_LABEL;
    const NODE_POOL_LABEL: &'static str = CASSANDRA_NODE_POOL_LABEL;

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn image(&self) -> &ImageSpec {
        &self.spec.image
    }

    fn node_pool_names(&self) -> Vec<String> {
        self.spec.node_pools.iter().map(|p| p.name.clone()).collect()
    }

    fn node_pool_replicas(&self, pool: &str) -> Option<i32> {
        self.spec
            .node_pools
            .iter()
            .find(|p| p.name == pool)
            .map(|p| p.replicas)
    }

    fn drain_policy(&self, _pool: &str) -> DrainPolicy {
        DrainPolicy::Decommission
    }

    fn pilot_version(pilot: &Pilot) -> Option<&str> {
        pilot.cassandra_status()?.version.as_deref()
    }

    fn health(&self) -> Option<Health> {
        None
    }

    fn store(state: &State) -> &Arc<dyn ObjectStore<Self>> {
        &state.cassandra_clusters
    }

    fn statefulset(&self, pool: &str) -> Result<StatefulSet> {
        let spec = self
            .spec
            .node_pools
            .iter()
            .find(|p| p.name == pool)
            .ok_or_else(|| Error::invalid(format!("unknown node pool {pool}")))?;
        builders::cassandra::statefulset(self, spec)
    }

    fn services(&self) -> Vec<Service> {
        builders::cassandra::services(self)
    }
}
