//! Manifests for CassandraCluster node pools.

use super::{
    client_service, discovery_service, env, object_meta, pod_identity_env, resource_requirements,
    service_port, volume_claim_templates, PILOT_READINESS_PORT,
};
use crate::crd::{CassandraCluster, CassandraClusterNodePool, PersistenceConfig, ResourceRequirements};
use crate::error::{Error, Result};
use crate::kind::ClusterKind;
use crate::labels::{CASSANDRA_SEED_LABEL, DEPLOYED_VERSION_ANNOTATION, NODE_POOL_HASH_ANNOTATION};
use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, HTTPGetAction, PodSpec, PodTemplateSpec,
    Probe, Service, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;

pub const INTRA_NODE_PORT: i32 = 7000;
pub const JMX_PORT: i32 = 7199;

const DATA_PATH: &str = "/var/lib/cassandra";
const SHARED_PATH: &str = "/shared";

#[derive(Serialize)]
struct NodePoolHashInput<'a> {
    replicas: i32,
    image: String,
    resources: &'a ResourceRequirements,
    persistence: &'a PersistenceConfig,
    datacenter: &'a Option<String>,
    rack: &'a Option<String>,
    cql_port: i32,
}

pub fn node_pool_hash(cluster: &CassandraCluster, pool: &CassandraClusterNodePool) -> Result<String> {
    super::content_hash(&NodePoolHashInput {
        replicas: pool.replicas,
        image: cluster.target_image(),
        resources: &pool.resources,
        persistence: &pool.persistence,
        datacenter: &pool.datacenter,
        rack: &pool.rack,
        cql_port: cluster.spec.cql_port,
    })
}

pub fn seed_service_name(cluster: &CassandraCluster) -> String {
    format!("{}-seeds", cluster.resource_name())
}

pub fn services(cluster: &CassandraCluster) -> Vec<Service> {
    let mut seed_selector = cluster.cluster_labels();
    seed_selector.insert(CASSANDRA_SEED_LABEL.to_string(), "true".to_string());

    let seeds = Service {
        metadata: object_meta(cluster, seed_service_name(cluster)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(seed_selector),
            ports: Some(vec![service_port("intra-node", INTRA_NODE_PORT)]),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    vec![
        discovery_service(
            cluster,
            vec![
                service_port("intra-node", INTRA_NODE_PORT),
                service_port("jmx", JMX_PORT),
            ],
        ),
        seeds,
        client_service(cluster, vec![service_port("cql", cluster.spec.cql_port)]),
    ]
}

pub fn statefulset(
    cluster: &CassandraCluster,
    pool: &CassandraClusterNodePool,
) -> Result<StatefulSet> {
    if pool.replicas < 0 {
        return Err(Error::invalid(format!(
            "node pool {} has negative replicas",
            pool.name
        )));
    }
    if pool.seeds < 0 {
        return Err(Error::invalid(format!(
            "node pool {} has negative seeds",
            pool.name
        )));
    }
    if cluster.spec.image.repository.is_empty() || cluster.spec.pilot_image.repository.is_empty()
    {
        return Err(Error::invalid("cassandra and pilot images must be set"));
    }

    let selector = cluster.node_pool_labels(&pool.name);
    let mut meta = object_meta(cluster, cluster.statefulset_name(&pool.name));
    meta.labels = Some(selector.clone());
    meta.annotations = Some(BTreeMap::from([
        (
            NODE_POOL_HASH_ANNOTATION.to_string(),
            node_pool_hash(cluster, pool)?,
        ),
        (
            DEPLOYED_VERSION_ANNOTATION.to_string(),
            cluster.spec.version.clone(),
        ),
    ]));

    Ok(StatefulSet {
        metadata: meta,
        spec: Some(StatefulSetSpec {
            replicas: Some(pool.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            service_name: format!("{}-discovery", cluster.resource_name()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(cluster.pod_labels(&pool.name)),
                    ..Default::default()
                }),
                spec: Some(pod_spec(cluster, pool)),
            },
            volume_claim_templates: volume_claim_templates(&pool.persistence),
            pod_management_policy: Some("OrderedReady".to_string()),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy::default()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn pod_spec(cluster: &CassandraCluster, pool: &CassandraClusterNodePool) -> PodSpec {
    let namespace = cluster.namespace().unwrap_or_default();
    let mut env_vars = pod_identity_env();
    env_vars.extend([
        env("CASSANDRA_CLUSTER_NAME", cluster.name_any()),
        env(
            "CASSANDRA_SEEDS",
            format!("{}.{namespace}.svc.cluster.local", seed_service_name(cluster)),
        ),
        env(
            "CASSANDRA_DC",
            pool.datacenter.clone().unwrap_or_else(|| "dc1".to_string()),
        ),
        env(
            "CASSANDRA_RACK",
            pool.rack.clone().unwrap_or_else(|| pool.name.clone()),
        ),
        env("CASSANDRA_ENDPOINT_SNITCH", "GossipingPropertyFileSnitch"),
    ]);

    let shared = VolumeMount {
        name: "shared".to_string(),
        mount_path: SHARED_PATH.to_string(),
        ..Default::default()
    };

    let install_pilot = Container {
        name: "install-pilot".to_string(),
        image: Some(cluster.spec.pilot_image.reference(&cluster.spec.version)),
        image_pull_policy: Some(cluster.spec.pilot_image.pull_policy.clone()),
        command: Some(vec![
            "cp".to_string(),
            "/pilot".to_string(),
            format!("{SHARED_PATH}/pilot"),
        ]),
        volume_mounts: Some(vec![shared.clone()]),
        ..Default::default()
    };

    let port = |name: &str, container_port: i32| ContainerPort {
        name: Some(name.to_string()),
        container_port,
        ..Default::default()
    };

    let container = Container {
        name: "cassandra".to_string(),
        image: Some(cluster.target_image()),
        image_pull_policy: Some(cluster.spec.image.pull_policy.clone()),
        command: Some(vec![format!("{SHARED_PATH}/pilot")]),
        args: Some(vec![
            "--pilot-name=$(POD_NAME)".to_string(),
            "--pilot-namespace=$(POD_NAMESPACE)".to_string(),
            format!("--cassandra-cql-port={}", cluster.spec.cql_port),
        ]),
        env: Some(env_vars),
        ports: Some(vec![
            port("cql", cluster.spec.cql_port),
            port("intra-node", INTRA_NODE_PORT),
            port("jmx", JMX_PORT),
        ]),
        resources: Some(resource_requirements(&pool.resources)),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "data".to_string(),
                mount_path: DATA_PATH.to_string(),
                ..Default::default()
            },
            shared,
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/".to_string()),
                port: IntOrString::Int(PILOT_READINESS_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(60),
            period_seconds: Some(10),
            timeout_seconds: Some(5),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut volumes = vec![Volume {
        name: "shared".to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }];
    if !pool.persistence.enabled {
        volumes.push(Volume {
            name: "data".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    PodSpec {
        service_account_name: Some(cluster.resource_name()),
        init_containers: Some(vec![install_pilot]),
        containers: vec![container],
        volumes: Some(volumes),
        termination_grace_period_seconds: Some(600),
        ..Default::default()
    }
}
