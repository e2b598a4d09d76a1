//! ElasticsearchCluster Custom Resource Definition

use super::common::{
    ClusterCondition, Health, ImageSpec, NodePoolStatus, PersistenceConfig, ResourceRequirements,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ElasticsearchCluster is the Schema for the elasticsearchclusters API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "navigator.jetstack.io",
    version = "v1alpha1",
    kind = "ElasticsearchCluster",
    namespaced,
    status = "ElasticsearchClusterStatus",
    shortname = "esc",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchClusterSpec {
    /// Elasticsearch version every node pool should run
    pub version: String,

    /// Elasticsearch container image
    pub image: ImageSpec,

    /// Image carrying the pilot sidecar
    pub pilot_image: ImageSpec,

    /// Node pools making up the cluster
    #[serde(default)]
    pub node_pools: Vec<ElasticsearchClusterNodePool>,

    /// Plugins installed before Elasticsearch starts
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Kernel parameters applied by a privileged init container
    #[serde(default = "default_sysctls")]
    pub sysctls: Vec<String>,

    /// discovery.zen.minimum_master_nodes
    #[serde(default)]
    pub min_master_nodes: Option<i32>,
}

/// A homogeneous group of Elasticsearch nodes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchClusterNodePool {
    pub name: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Roles performed by every node in the pool
    #[serde(default)]
    pub roles: Vec<ElasticsearchRole>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ElasticsearchClusterNodePool {
    /// Pools holding shards must be drained before a replica is removed.
    pub fn is_data_bearing(&self) -> bool {
        self.roles.contains(&ElasticsearchRole::Data)
    }

    pub fn has_role(&self, role: ElasticsearchRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Elasticsearch node role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElasticsearchRole {
    Master,
    Data,
    Ingest,
}

impl ElasticsearchRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElasticsearchRole::Master => "master",
            ElasticsearchRole::Data => "data",
            ElasticsearchRole::Ingest => "ingest",
        }
    }
}

/// Status of the ElasticsearchCluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchClusterStatus {
    /// Observed state per node pool, keyed by pool name
    #[serde(default)]
    pub node_pools: BTreeMap<String, NodePoolStatus>,

    /// Aggregate cluster health
    #[serde(default)]
    pub health: Option<Health>,

    /// Conditions representing cluster state
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

fn default_replicas() -> i32 {
    1
}

fn default_sysctls() -> Vec<String> {
    vec!["vm.max_map_count=262144".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_spec_defaults() {
        let spec: ElasticsearchClusterSpec = serde_json::from_str(
            r#"{
                "version": "6.1.1",
                "image": {"repository": "docker.elastic.co/elasticsearch/elasticsearch"},
                "pilotImage": {"repository": "navigator/pilot-elasticsearch", "tag": "v0.1.0"},
                "nodePools": [{"name": "data", "roles": ["data", "ingest"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.sysctls, vec!["vm.max_map_count=262144"]);
        assert_eq!(spec.node_pools.len(), 1);
        assert_eq!(spec.node_pools[0].replicas, 1);
        assert!(spec.node_pools[0].is_data_bearing());
        assert!(!spec.node_pools[0].has_role(ElasticsearchRole::Master));
    }

    #[test]
    fn test_master_only_pool_is_not_data_bearing() {
        let pool = ElasticsearchClusterNodePool {
            name: "master".to_string(),
            replicas: 3,
            roles: vec![ElasticsearchRole::Master],
            resources: Default::default(),
            persistence: Default::default(),
        };
        assert!(!pool.is_data_bearing());
    }

    #[test]
    fn test_status_default() {
        let status = ElasticsearchClusterStatus::default();
        assert!(status.node_pools.is_empty());
        assert_eq!(status.health, None);
    }
}
