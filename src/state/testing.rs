//! In-memory stores and fixtures for unit tests.

use super::{KubeObject, ObjectStore, State};
use crate::crd::{
    CassandraCluster, CassandraClusterNodePool, CassandraClusterSpec, ElasticsearchCluster,
    ElasticsearchClusterNodePool, ElasticsearchClusterSpec, ElasticsearchPilotStatus,
    ElasticsearchRole, ImageSpec, Pilot, PilotSpec, PilotStatus,
};
use crate::error::{Error, Result};
use crate::events::EventPublisher;
use crate::ownership::matches_labels;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";

/// `ObjectStore` over a map, counting every write.
pub struct FakeStore<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    status_updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl<K: KubeObject> Default for FakeStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            status_updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

impl<K: KubeObject> FakeStore<K> {
    /// Seed an object without counting a write.
    pub fn insert(&self, obj: K) {
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub fn fetch(&self, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn all(&self) -> Vec<K> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn status_updates(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.updates() + self.status_updates() + self.deletes()
    }

    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }
}

#[async_trait]
impl<K: KubeObject> ObjectStore<K> for FakeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&Self::key(namespace, name))
            .cloned())
    }

    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<K>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && matches_labels(obj.meta(), selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(namespace, &obj.name_any());
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: K::kind(&()).to_string(),
                name: obj.name_any(),
            });
        }
        let mut created = obj.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        if created.meta().uid.is_none() {
            created.meta_mut().uid = Some(format!("uid-{}", obj.name_any()));
        }
        objects.insert(key, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(namespace, &obj.name_any());
        if !objects.contains_key(&key) {
            return Err(Error::NotFound {
                kind: K::kind(&()).to_string(),
                name: obj.name_any(),
            });
        }
        objects.insert(key, obj.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(obj.clone())
    }

    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(namespace, &obj.name_any());
        if !objects.contains_key(&key) {
            return Err(Error::NotFound {
                kind: K::kind(&()).to_string(),
                name: obj.name_any(),
            });
        }
        objects.insert(key, obj.clone());
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(obj.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        if self
            .objects
            .lock()
            .unwrap()
            .remove(&Self::key(namespace, name))
            .is_some()
        {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Store whose reads lag behind the API server: lookups see nothing while
/// writes reach the wrapped `FakeStore`.
pub struct StaleCache<K>(pub Arc<FakeStore<K>>);

#[async_trait]
impl<K: KubeObject> ObjectStore<K> for StaleCache<K> {
    async fn get(&self, _namespace: &str, _name: &str) -> Result<Option<K>> {
        Ok(None)
    }

    async fn list(&self, _namespace: &str, _selector: &BTreeMap<String, String>) -> Result<Vec<K>> {
        Ok(Vec::new())
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        self.0.create(namespace, obj).await
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K> {
        self.0.update(namespace, obj).await
    }

    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K> {
        self.0.update_status(namespace, obj).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.0.delete(namespace, name).await
    }
}

/// Event sink remembering `(type, reason)` pairs.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(EventType, String, String)>>,
}

impl RecordingPublisher {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| *t == EventType::Warning)
            .count()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        _reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: String,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((type_, reason.to_string(), note));
    }
}

/// A `State` whose stores stay reachable for assertions.
pub struct TestState {
    pub state: State,
    pub statefulsets: Arc<FakeStore<StatefulSet>>,
    pub pods: Arc<FakeStore<Pod>>,
    pub services: Arc<FakeStore<Service>>,
    pub configmaps: Arc<FakeStore<ConfigMap>>,
    pub service_accounts: Arc<FakeStore<ServiceAccount>>,
    pub roles: Arc<FakeStore<Role>>,
    pub role_bindings: Arc<FakeStore<RoleBinding>>,
    pub pilots: Arc<FakeStore<Pilot>>,
    pub elasticsearch_clusters: Arc<FakeStore<ElasticsearchCluster>>,
    pub cassandra_clusters: Arc<FakeStore<CassandraCluster>>,
    pub events: Arc<RecordingPublisher>,
}

impl TestState {
    pub fn new() -> Self {
        let statefulsets = Arc::new(FakeStore::default());
        let pods = Arc::new(FakeStore::default());
        let services = Arc::new(FakeStore::default());
        let configmaps = Arc::new(FakeStore::default());
        let service_accounts = Arc::new(FakeStore::default());
        let roles = Arc::new(FakeStore::default());
        let role_bindings = Arc::new(FakeStore::default());
        let pilots = Arc::new(FakeStore::default());
        let elasticsearch_clusters = Arc::new(FakeStore::default());
        let cassandra_clusters = Arc::new(FakeStore::default());
        let events = Arc::new(RecordingPublisher::default());
        let state = State {
            statefulsets: statefulsets.clone(),
            pods: pods.clone(),
            services: services.clone(),
            configmaps: configmaps.clone(),
            service_accounts: service_accounts.clone(),
            roles: roles.clone(),
            role_bindings: role_bindings.clone(),
            pilots: pilots.clone(),
            elasticsearch_clusters: elasticsearch_clusters.clone(),
            cassandra_clusters: cassandra_clusters.clone(),
            recorder: events.clone(),
        };
        Self {
            state,
            statefulsets,
            pods,
            services,
            configmaps,
            service_accounts,
            roles,
            role_bindings,
            pilots,
            elasticsearch_clusters,
            cassandra_clusters,
            events,
        }
    }
}

pub fn image(repository: &str) -> ImageSpec {
    ImageSpec {
        repository: repository.to_string(),
        tag: None,
        pull_policy: "IfNotPresent".to_string(),
    }
}

/// Elasticsearch cluster "demo" with a single data pool.
pub fn es_cluster(version: &str, replicas: i32) -> ElasticsearchCluster {
    let mut cluster = ElasticsearchCluster::new(
        "demo",
        ElasticsearchClusterSpec {
            version: version.to_string(),
            image: image("es"),
            pilot_image: ImageSpec {
                tag: Some("v0.1.0".to_string()),
                ..image("pilot")
            },
            node_pools: vec![ElasticsearchClusterNodePool {
                name: "data".to_string(),
                replicas,
                roles: vec![ElasticsearchRole::Data],
                resources: Default::default(),
                persistence: Default::default(),
            }],
            plugins: vec![],
            sysctls: vec![],
            min_master_nodes: None,
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("uid-es-demo".to_string());
    cluster
}

/// Cassandra cluster "demo" with a single ring pool.
pub fn cass_cluster(version: &str, replicas: i32) -> CassandraCluster {
    let mut cluster = CassandraCluster::new(
        "demo",
        CassandraClusterSpec {
            version: version.to_string(),
            image: image("cassandra"),
            pilot_image: ImageSpec {
                tag: Some("v0.1.0".to_string()),
                ..image("pilot")
            },
            cql_port: 9042,
            node_pools: vec![CassandraClusterNodePool {
                name: "ringnodes".to_string(),
                replicas,
                datacenter: None,
                rack: None,
                resources: Default::default(),
                persistence: Default::default(),
                seeds: 1,
            }],
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("uid-cass-demo".to_string());
    cluster
}

/// Pilot as the sidecar would leave it, with pool labels copied from its pod.
pub fn pilot(name: &str, labels: &BTreeMap<String, String>) -> Pilot {
    let mut pilot = Pilot::new(name, PilotSpec::default());
    pilot.metadata.namespace = Some(NAMESPACE.to_string());
    pilot.metadata.labels = Some(labels.clone());
    pilot
}

pub fn es_pilot(
    name: &str,
    labels: &BTreeMap<String, String>,
    documents: i64,
    version: &str,
) -> Pilot {
    let mut p = pilot(name, labels);
    p.status = Some(PilotStatus {
        elasticsearch: Some(ElasticsearchPilotStatus {
            documents: Some(documents),
            version: Some(version.to_string()),
            cluster_health: None,
        }),
        ..Default::default()
    });
    p
}

/// Mark `sts` as fully rolled out with `ready` ready replicas.
pub fn set_sts_status(sts: &mut StatefulSet, ready: i32, updated: i32) {
    let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    sts.status = Some(k8s_openapi::api::apps::v1::StatefulSetStatus {
        replicas,
        ready_replicas: Some(ready),
        updated_replicas: Some(updated),
        ..Default::default()
    });
}
