//! CassandraCluster Custom Resource Definition

use super::common::{
    ClusterCondition, ImageSpec, NodePoolStatus, PersistenceConfig, ResourceRequirements,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CassandraCluster is the Schema for the cassandraclusters API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "navigator.jetstack.io",
    version = "v1alpha1",
    kind = "CassandraCluster",
    namespaced,
    status = "CassandraClusterStatus",
    shortname = "cass",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CassandraClusterSpec {
    /// Cassandra version every node pool should run
    pub version: String,

    /// Cassandra container image
    pub image: ImageSpec,

    /// Image carrying the pilot sidecar
    pub pilot_image: ImageSpec,

    /// CQL native transport port
    #[serde(default = "default_cql_port")]
    pub cql_port: i32,

    /// Node pools making up the cluster
    #[serde(default)]
    pub node_pools: Vec<CassandraClusterNodePool>,
}

/// A rack of Cassandra nodes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CassandraClusterNodePool {
    pub name: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub datacenter: Option<String>,

    #[serde(default)]
    pub rack: Option<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Number of lowest-ordinal replicas labelled as seeds
    #[serde(default = "default_seeds")]
    pub seeds: i32,
}

/// Status of the CassandraCluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CassandraClusterStatus {
    /// Observed state per node pool, keyed by pool name
    #[serde(default)]
    pub node_pools: BTreeMap<String, NodePoolStatus>,

    /// Conditions representing cluster state
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

fn default_cql_port() -> i32 {
    9042
}

fn default_replicas() -> i32 {
    1
}

fn default_seeds() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_spec_defaults() {
        let spec: CassandraClusterSpec = serde_json::from_str(
            r#"{
                "version": "3.11.1",
                "image": {"repository": "cassandra"},
                "pilotImage": {"repository": "navigator/pilot-cassandra", "tag": "v0.1.0"},
                "nodePools": [{"name": "ringnodes", "replicas": 3}]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.cql_port, 9042);
        assert_eq!(spec.node_pools[0].seeds, 1);
        assert_eq!(spec.node_pools[0].replicas, 3);
        assert!(spec.node_pools[0].persistence.enabled);
    }
}
