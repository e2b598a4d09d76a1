//! Custom Resource Definitions for the Navigator controller
//!
//! - ElasticsearchCluster: an Elasticsearch deployment made of node pools
//! - CassandraCluster: a Cassandra deployment made of node pools
//! - Pilot: the per-pod companion resource written by the pilot sidecar

mod cassandra;
mod common;
mod elasticsearch;
mod pilot;

pub use cassandra::{
    CassandraCluster, CassandraClusterNodePool, CassandraClusterSpec, CassandraClusterStatus,
};
pub use common::{
    ClusterCondition, Health, ImageSpec, NodePoolStatus, PersistenceConfig, ResourceList,
    ResourceRequirements,
};
pub use elasticsearch::{
    ElasticsearchCluster, ElasticsearchClusterNodePool, ElasticsearchClusterSpec,
    ElasticsearchClusterStatus, ElasticsearchRole,
};
pub use pilot::{
    CassandraPilotStatus, ElasticsearchPilotStatus, Pilot, PilotSpec, PilotStatus,
};
