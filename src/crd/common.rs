//! Types shared by the Elasticsearch and Cassandra cluster resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Container image for the database or the pilot
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository, e.g. "docker.elastic.co/elasticsearch/elasticsearch"
    pub repository: String,
    /// Image tag. Defaults to the cluster version when unset.
    #[serde(default)]
    pub tag: Option<String>,
    /// Image pull policy
    #[serde(default = "default_pull_policy")]
    pub pull_policy: String,
}

impl ImageSpec {
    /// Full image reference, falling back to `version` when no tag is pinned.
    pub fn reference(&self, version: &str) -> String {
        let tag = self.tag.as_deref().unwrap_or(version);
        format!("{}:{}", self.repository, tag)
    }
}

/// Resource requirements for containers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Resource limits
    #[serde(default)]
    pub limits: ResourceList,
    /// Resource requests
    #[serde(default)]
    pub requests: ResourceList,
}

/// Resource quantities
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
pub struct ResourceList {
    /// CPU limit/request (e.g., "500m", "2")
    #[serde(default)]
    pub cpu: Option<String>,
    /// Memory limit/request (e.g., "512Mi", "2Gi")
    #[serde(default)]
    pub memory: Option<String>,
}

/// Persistent storage for a node pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Provision a volume claim per replica
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Size of each volume (e.g., "10Gi")
    #[serde(default = "default_storage_size")]
    pub size: String,
    /// Storage class name for PVCs
    #[serde(default)]
    pub storage_class: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: default_storage_size(),
            storage_class: None,
        }
    }
}

/// Aggregate health of a cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub enum Health {
    Green,
    Yellow,
    Red,
}

/// Observed state of one node pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Replicas of the pool's StatefulSet reporting Ready
    #[serde(default)]
    pub ready_replicas: i32,
}

/// Condition of a cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

pub(crate) fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_reference_uses_version_without_tag() {
        let image = ImageSpec {
            repository: "es".to_string(),
            tag: None,
            pull_policy: default_pull_policy(),
        };
        assert_eq!(image.reference("6.1.2"), "es:6.1.2");
    }

    #[test]
    fn test_image_reference_prefers_pinned_tag() {
        let image: ImageSpec =
            serde_json::from_str(r#"{"repository":"es","tag":"6.1.2-custom"}"#).unwrap();
        assert_eq!(image.reference("6.1.2"), "es:6.1.2-custom");
        assert_eq!(image.pull_policy, "IfNotPresent");
    }

    #[test]
    fn test_persistence_defaults() {
        let persistence: PersistenceConfig = serde_json::from_str("{}").unwrap();
        assert!(persistence.enabled);
        assert_eq!(persistence.size, "10Gi");
    }

    #[test]
    fn test_health_ordering() {
        assert!(Health::Red > Health::Yellow);
        assert!(Health::Yellow > Health::Green);
    }
}
