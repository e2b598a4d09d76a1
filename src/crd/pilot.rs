//! Pilot Custom Resource Definition
//!
//! One Pilot exists per managed pod and shares the pod's name. The spec is
//! written by the controller (decommission requests); the status is written
//! by the pilot sidecar running next to the database process.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "navigator.jetstack.io",
    version = "v1alpha1",
    kind = "Pilot",
    namespaced,
    status = "PilotStatus",
    printcolumn = r#"{"name":"Decommissioned","type":"boolean","jsonPath":".spec.decommissioned"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PilotSpec {
    /// Ask the sidecar to hand off this replica's data
    #[serde(default)]
    pub decommissioned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PilotStatus {
    #[serde(default)]
    pub elasticsearch: Option<ElasticsearchPilotStatus>,

    #[serde(default)]
    pub cassandra: Option<CassandraPilotStatus>,

    /// Time of the sidecar's last completed sync
    #[serde(default)]
    pub last_completed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchPilotStatus {
    /// Documents held by the node
    #[serde(default)]
    pub documents: Option<i64>,

    /// Version reported by the running node
    #[serde(default)]
    pub version: Option<String>,

    /// Cluster health as seen from this node
    #[serde(default)]
    pub cluster_health: Option<super::Health>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CassandraPilotStatus {
    /// Node has left the ring
    #[serde(default)]
    pub decommissioned: bool,

    /// Version reported by the running node
    #[serde(default)]
    pub version: Option<String>,
}

impl Pilot {
    pub fn elasticsearch_status(&self) -> Option<&ElasticsearchPilotStatus> {
        self.status.as_ref().and_then(|s| s.elasticsearch.as_ref())
    }

    pub fn cassandra_status(&self) -> Option<&CassandraPilotStatus> {
        self.status.as_ref().and_then(|s| s.cassandra.as_ref())
    }
}
