//! Navigator
//!
//! A Kubernetes controller for stateful database clusters.
//!
//! ## Custom Resources
//!
//! - `ElasticsearchCluster`: node pools of Elasticsearch, one StatefulSet each
//! - `CassandraCluster`: node pools of Cassandra with seed labelling
//! - `Pilot`: one per database pod, written by the pilot sidecar
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: navigator.jetstack.io/v1alpha1
//! kind: ElasticsearchCluster
//! metadata:
//!   name: demo
//! spec:
//!   version: 6.1.1
//!   image:
//!     repository: docker.elastic.co/elasticsearch/elasticsearch
//!   pilotImage:
//!     repository: quay.io/jetstack/navigator-pilot-elasticsearch
//!     tag: v0.1.0
//!   nodePools:
//!   - name: data
//!     replicas: 3
//!     roles: [master, data, ingest]
//! ```

pub mod actions;
pub mod builders;
pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod kind;
pub mod labels;
pub mod ownership;
pub mod reconcilers;
pub mod state;
pub mod telemetry;

pub use config::OperatorConfig;
pub use controllers::{Context, Registry};
pub use crd::{
    CassandraCluster, CassandraClusterNodePool, CassandraClusterSpec, CassandraClusterStatus,
    ClusterCondition, ElasticsearchCluster, ElasticsearchClusterNodePool, ElasticsearchClusterSpec,
    ElasticsearchClusterStatus, ElasticsearchRole, Health, Pilot, PilotSpec, PilotStatus,
};
pub use error::{Error, ErrorClass, Result};
