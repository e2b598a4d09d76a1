//! Desired-state manifests.
//!
//! Every builder is a pure function of the cluster (and node pool) it is
//! given, so two calls with the same input produce identical objects.

pub mod cassandra;
pub mod elasticsearch;

use crate::crd::{PersistenceConfig, ResourceRequirements as ResourceSpec};
use crate::kind::ClusterKind;
use crate::ownership::owner_reference;
use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    ResourceRequirements, Service, ServiceAccount, ServicePort, ServiceSpec,
    VolumeResourceRequirements,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Port the pilot serves readiness on.
pub const PILOT_READINESS_PORT: i32 = 12001;

/// Metadata for a cluster-scoped object named `name`.
pub fn object_meta<C: ClusterKind>(cluster: &C, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(cluster.cluster_labels()),
        owner_references: Some(vec![owner_reference(cluster)]),
        ..Default::default()
    }
}

pub fn service_account<C: ClusterKind>(cluster: &C) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(cluster, cluster.resource_name()),
        ..Default::default()
    }
}

/// Permissions the pilot sidecar needs to report on its own replica.
pub fn role<C: ClusterKind>(cluster: &C) -> Role {
    Role {
        metadata: object_meta(cluster, cluster.resource_name()),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["navigator.jetstack.io".to_string()]),
                resources: Some(vec!["pilots".to_string()]),
                verbs: strings(&["get", "list", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["navigator.jetstack.io".to_string()]),
                resources: Some(vec!["pilots/status".to_string()]),
                verbs: strings(&["update", "patch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: strings(&["get", "list", "watch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["events".to_string()]),
                verbs: strings(&["create", "update", "patch"]),
                ..Default::default()
            },
        ]),
    }
}

pub fn role_binding<C: ClusterKind>(cluster: &C) -> RoleBinding {
    let name = cluster.resource_name();
    RoleBinding {
        metadata: object_meta(cluster, name.clone()),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: cluster.namespace(),
            ..Default::default()
        }]),
    }
}

/// Headless service giving every replica a stable DNS name.
pub fn discovery_service<C: ClusterKind>(cluster: &C, ports: Vec<ServicePort>) -> Service {
    Service {
        metadata: object_meta(cluster, format!("{}-discovery", cluster.resource_name())),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(cluster.cluster_labels()),
            ports: Some(ports),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Load-balanced service clients connect through.
pub fn client_service<C: ClusterKind>(cluster: &C, ports: Vec<ServicePort>) -> Service {
    Service {
        metadata: object_meta(cluster, cluster.resource_name()),
        spec: Some(ServiceSpec {
            selector: Some(cluster.cluster_labels()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        ..Default::default()
    }
}

pub fn resource_requirements(spec: &ResourceSpec) -> ResourceRequirements {
    let mut limits = BTreeMap::new();
    let mut requests = BTreeMap::new();

    if let Some(cpu) = &spec.limits.cpu {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.limits.memory {
        limits.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(cpu) = &spec.requests.cpu {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.requests.memory {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }

    ResourceRequirements {
        limits: (!limits.is_empty()).then_some(limits),
        requests: (!requests.is_empty()).then_some(requests),
        ..Default::default()
    }
}

/// One `data` claim per replica, or none when persistence is disabled.
pub fn volume_claim_templates(persistence: &PersistenceConfig) -> Option<Vec<PersistentVolumeClaim>> {
    if !persistence.enabled {
        return None;
    }
    Some(vec![PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some("data".to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: persistence.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(persistence.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }])
}

/// Downward-API env vars every pilot needs to find its own Pilot resource.
pub fn pod_identity_env() -> Vec<EnvVar> {
    ["POD_NAME", "POD_NAMESPACE"]
        .iter()
        .zip(["metadata.name", "metadata.namespace"])
        .map(|(name, path)| EnvVar {
            name: name.to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: path.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Hex SHA-256 of the JSON encoding of `input`.
pub fn content_hash<T: Serialize>(input: &T) -> crate::Result<String> {
    let bytes = serde_json::to_vec(input)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
