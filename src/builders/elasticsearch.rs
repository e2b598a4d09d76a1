//! Manifests for ElasticsearchCluster node pools.

use super::{
    client_service, discovery_service, env, object_meta, pod_identity_env, resource_requirements,
    service_port, volume_claim_templates, PILOT_READINESS_PORT,
};
use crate::crd::{
    ElasticsearchCluster, ElasticsearchClusterNodePool, ElasticsearchRole, PersistenceConfig,
    ResourceRequirements,
};
use crate::error::{Error, Result};
use crate::kind::ClusterKind;
use crate::labels::{
    DEPLOYED_VERSION_ANNOTATION, ELASTICSEARCH_ROLE_LABEL_PREFIX, NODE_POOL_HASH_ANNOTATION,
};
use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
    HTTPGetAction, PodSpec, PodTemplateSpec, Probe, SecurityContext, Service, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;

pub const HTTP_PORT: i32 = 9200;
pub const TRANSPORT_PORT: i32 = 9300;

const DATA_PATH: &str = "/usr/share/elasticsearch/data";
const CONFIG_PATH: &str = "/usr/share/elasticsearch/config/elasticsearch.yml";
const SHARED_PATH: &str = "/shared";

/// Fields whose change requires the StatefulSet to be rewritten.
#[derive(Serialize)]
struct NodePoolHashInput<'a> {
    replicas: i32,
    image: String,
    resources: &'a ResourceRequirements,
    roles: &'a [ElasticsearchRole],
    persistence: &'a PersistenceConfig,
    plugins: &'a [String],
    sysctls: &'a [String],
}

pub fn node_pool_hash(
    cluster: &ElasticsearchCluster,
    pool: &ElasticsearchClusterNodePool,
) -> Result<String> {
    super::content_hash(&NodePoolHashInput {
        replicas: pool.replicas,
        image: cluster.target_image(),
        resources: &pool.resources,
        roles: &pool.roles,
        persistence: &pool.persistence,
        plugins: &cluster.spec.plugins,
        sysctls: &cluster.spec.sysctls,
    })
}

pub fn config_map_name(cluster: &ElasticsearchCluster) -> String {
    format!("{}-config", cluster.resource_name())
}

pub fn services(cluster: &ElasticsearchCluster) -> Vec<Service> {
    vec![
        discovery_service(cluster, vec![service_port("transport", TRANSPORT_PORT)]),
        client_service(cluster, vec![service_port("http", HTTP_PORT)]),
    ]
}

/// Quorum of master-eligible nodes, unless pinned in the spec.
pub fn minimum_master_nodes(cluster: &ElasticsearchCluster) -> i32 {
    if let Some(n) = cluster.spec.min_master_nodes {
        return n;
    }
    let masters: i32 = cluster
        .spec
        .node_pools
        .iter()
        .filter(|p| p.has_role(ElasticsearchRole::Master))
        .map(|p| p.replicas)
        .sum();
    masters / 2 + 1
}

pub fn config_map(cluster: &ElasticsearchCluster) -> ConfigMap {
    let config = format!(
        r#"cluster.name: {name}
network.host: 0.0.0.0
node.master: ${{NODE_MASTER}}
node.data: ${{NODE_DATA}}
node.ingest: ${{NODE_INGEST}}
discovery.zen.ping.unicast.hosts: {discovery}
discovery.zen.minimum_master_nodes: {min_masters}
"#,
        name = cluster.name_any(),
        discovery = format!("{}-discovery", cluster.resource_name()),
        min_masters = minimum_master_nodes(cluster),
    );

    ConfigMap {
        metadata: object_meta(cluster, config_map_name(cluster)),
        data: Some(BTreeMap::from([("elasticsearch.yml".to_string(), config)])),
        ..Default::default()
    }
}

pub fn statefulset(
    cluster: &ElasticsearchCluster,
    pool: &ElasticsearchClusterNodePool,
) -> Result<StatefulSet> {
    if pool.replicas < 0 {
        return Err(Error::invalid(format!(
            "node pool {} has negative replicas",
            pool.name
        )));
    }
    if cluster.spec.image.repository.is_empty() || cluster.spec.pilot_image.repository.is_empty()
    {
        return Err(Error::invalid("elasticsearch and pilot images must be set"));
    }

    let name = cluster.statefulset_name(&pool.name);
    let selector = cluster.node_pool_labels(&pool.name);
    let mut pod_labels = cluster.pod_labels(&pool.name);
    for role in &pool.roles {
        pod_labels.insert(
            format!("{ELASTICSEARCH_ROLE_LABEL_PREFIX}{}", role.as_str()),
            "true".to_string(),
        );
    }

    let mut meta = object_meta(cluster, name.clone());
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
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec(cluster, pool)),
            },
            volume_claim_templates: volume_claim_templates(&pool.persistence),
            pod_management_policy: Some("OrderedReady".to_string()),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: None,
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn pod_spec(cluster: &ElasticsearchCluster, pool: &ElasticsearchClusterNodePool) -> PodSpec {
    let role_flag = |role| {
        if pool.has_role(role) {
            "true"
        } else {
            "false"
        }
    };

    let mut env_vars = pod_identity_env();
    env_vars.push(env("NODE_MASTER", role_flag(ElasticsearchRole::Master)));
    env_vars.push(env("NODE_DATA", role_flag(ElasticsearchRole::Data)));
    env_vars.push(env("NODE_INGEST", role_flag(ElasticsearchRole::Ingest)));

    let roles = pool
        .roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let mut init_containers = Vec::new();
    if !cluster.spec.sysctls.is_empty() {
        let mut command = vec!["sysctl".to_string(), "-w".to_string()];
        command.extend(cluster.spec.sysctls.iter().cloned());
        init_containers.push(Container {
            name: "tune-sysctl".to_string(),
            image: Some(cluster.target_image()),
            command: Some(command),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    init_containers.push(Container {
        name: "install-pilot".to_string(),
        image: Some(cluster.spec.pilot_image.reference(&cluster.spec.version)),
        image_pull_policy: Some(cluster.spec.pilot_image.pull_policy.clone()),
        command: Some(vec![
            "cp".to_string(),
            "/pilot".to_string(),
            format!("{SHARED_PATH}/pilot"),
        ]),
        volume_mounts: Some(vec![mount("shared", SHARED_PATH, None)]),
        ..Default::default()
    });

    let mut volume_mounts = vec![
        mount("shared", SHARED_PATH, None),
        mount("config", CONFIG_PATH, Some("elasticsearch.yml")),
        mount("data", DATA_PATH, None),
    ];
    volume_mounts.sort_by(|a, b| a.name.cmp(&b.name));

    let container = Container {
        name: "elasticsearch".to_string(),
        image: Some(cluster.target_image()),
        image_pull_policy: Some(cluster.spec.image.pull_policy.clone()),
        command: Some(vec![format!("{SHARED_PATH}/pilot")]),
        args: Some(vec![
            "--pilot-name=$(POD_NAME)".to_string(),
            "--pilot-namespace=$(POD_NAMESPACE)".to_string(),
            format!("--elasticsearch-roles={roles}"),
            format!("--elasticsearch-plugins={}", cluster.spec.plugins.join(",")),
            format!("--elasticsearch-master-url=http://{}:{HTTP_PORT}", cluster.resource_name()),
        ]),
        env: Some(env_vars),
        ports: Some(vec![
            ContainerPort {
                name: Some("http".to_string()),
                container_port: HTTP_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("transport".to_string()),
                container_port: TRANSPORT_PORT,
                ..Default::default()
            },
        ]),
        resources: Some(resource_requirements(&pool.resources)),
        volume_mounts: Some(volume_mounts),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/".to_string()),
                port: IntOrString::Int(PILOT_READINESS_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(10),
            timeout_seconds: Some(5),
            failure_threshold: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut volumes = vec![
        Volume {
            name: "shared".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: "config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name(cluster),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    if !pool.persistence.enabled {
        volumes.push(Volume {
            name: "data".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    PodSpec {
        service_account_name: Some(cluster.resource_name()),
        init_containers: Some(init_containers),
        containers: vec![container],
        volumes: Some(volumes),
        termination_grace_period_seconds: Some(300),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str, sub_path: Option<&str>) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        sub_path: sub_path.map(str::to_string),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::es_cluster;

    #[test]
    fn test_statefulset_shape() {
        let cluster = es_cluster("6.1.1", 3);
        let sts = statefulset(&cluster, &cluster.spec.node_pools[0]).unwrap();
        let spec = sts.spec.as_ref().unwrap();
        assert_eq!(sts.metadata.name.as_deref(), Some("es-demo-data"));
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "es-demo-discovery");

        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("es:6.1.1"));
        assert_eq!(pod.service_account_name.as_deref(), Some("es-demo"));
        assert_eq!(
            pod.init_containers.as_ref().unwrap()[0].image.as_deref(),
            Some("pilot:v0.1.0")
        );

        let annotations = sts.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[DEPLOYED_VERSION_ANNOTATION], "6.1.1");
        assert_eq!(annotations[NODE_POOL_HASH_ANNOTATION].len(), 64);
    }

    #[test]
    fn test_statefulset_rejects_negative_replicas() {
        let cluster = es_cluster("6.1.1", -1);
        assert!(matches!(
            statefulset(&cluster, &cluster.spec.node_pools[0]),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_hash_tracks_relevant_fields() {
        let cluster = es_cluster("6.1.1", 3);
        let pool = &cluster.spec.node_pools[0];
        let base = node_pool_hash(&cluster, pool).unwrap();
        assert_eq!(base, node_pool_hash(&cluster, pool).unwrap());

        let mut scaled = pool.clone();
        scaled.replicas = 4;
        assert_ne!(base, node_pool_hash(&cluster, &scaled).unwrap());

        let upgraded = es_cluster("6.1.2", 3);
        assert_ne!(base, node_pool_hash(&upgraded, &upgraded.spec.node_pools[0]).unwrap());
    }

    #[test]
    fn test_minimum_master_nodes() {
        let mut cluster = es_cluster("6.1.1", 3);
        cluster.spec.node_pools[0].roles.push(ElasticsearchRole::Master);
        assert_eq!(minimum_master_nodes(&cluster), 2);
        cluster.spec.min_master_nodes = Some(1);
        assert_eq!(minimum_master_nodes(&cluster), 1);
    }

    #[test]
    fn test_config_map_renders_cluster_settings() {
        let cluster = es_cluster("6.1.1", 3);
        let cm = config_map(&cluster);
        let yml = &cm.data.unwrap()["elasticsearch.yml"];
        assert!(yml.contains("cluster.name: demo"));
        assert!(yml.contains("discovery.zen.ping.unicast.hosts: es-demo-discovery"));
    }
}
