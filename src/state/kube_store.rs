//! API-server backed [`ObjectStore`] and the reflector caches behind it.

use super::{KubeObject, ObjectStore, State};
use crate::crd::Pilot;
use crate::error::{Error, Result};
use crate::events::EventPublisher;
use crate::labels::PILOTED_LABEL;
use crate::ownership::{matches_labels, selector_string};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct KubeStore<K: KubeObject> {
    client: Client,
    cache: Option<Store<K>>,
}

impl<K: KubeObject> KubeStore<K> {
    /// Store reading straight from the API server.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: None,
        }
    }

    /// Store serving reads from a reflector cache.
    pub fn cached(client: Client, cache: Store<K>) -> Self {
        Self {
            client,
            cache: Some(cache),
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K: KubeObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        if let Some(cache) = &self.cache {
            let key = ObjectRef::<K>::new(name).within(namespace);
            return Ok(cache.get(&key).map(|obj| (*obj).clone()));
        }
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<K>> {
        if let Some(cache) = &self.cache {
            return Ok(cache
                .state()
                .into_iter()
                .filter(|obj| {
                    obj.namespace().as_deref() == Some(namespace)
                        && matches_labels(obj.meta(), selector)
                })
                .map(|obj| (*obj).clone())
                .collect());
        }
        let mut lp = ListParams::default();
        if !selector.is_empty() {
            lp = lp.labels(&selector_string(selector));
        }
        Ok(self.api(namespace).list(&lp).await?.items)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        match self.api(namespace).create(&PostParams::default(), obj).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::AlreadyExists {
                kind: K::kind(&()).to_string(),
                name: obj.name_any(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K> {
        Ok(self
            .api(namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K> {
        let data = serde_json::to_vec(obj)?;
        Ok(self
            .api(namespace)
            .replace_status(&obj.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reflector caches shared by every controller in the process.
#[derive(Clone)]
pub struct Caches {
    pub statefulsets: Store<StatefulSet>,
    pub pods: Store<Pod>,
    pub services: Store<Service>,
    pub configmaps: Store<ConfigMap>,
    pub service_accounts: Store<ServiceAccount>,
    pub roles: Store<Role>,
    pub role_bindings: Store<RoleBinding>,
    pub pilots: Store<Pilot>,
}

impl Caches {
    /// Start one reflector per cached kind. Must be called inside a tokio runtime.
    pub fn start(client: &Client, namespace: Option<&str>) -> Self {
        let all = watcher::Config::default();
        Self {
            statefulsets: spawn_reflector(api(client, namespace), all.clone()),
            pods: spawn_reflector(
                api(client, namespace),
                watcher::Config::default().labels(&format!("{PILOTED_LABEL}=true")),
            ),
            services: spawn_reflector(api(client, namespace), all.clone()),
            configmaps: spawn_reflector(api(client, namespace), all.clone()),
            service_accounts: spawn_reflector(api(client, namespace), all.clone()),
            roles: spawn_reflector(api(client, namespace), all.clone()),
            role_bindings: spawn_reflector(api(client, namespace), all.clone()),
            pilots: spawn_reflector(api(client, namespace), all),
        }
    }

    /// Block until every cache has completed its initial list.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let not_ready = |e: reflector::store::WriterDropped| Error::not_ready(e.to_string());
        self.statefulsets.wait_until_ready().await.map_err(not_ready)?;
        self.pods.wait_until_ready().await.map_err(not_ready)?;
        self.services.wait_until_ready().await.map_err(not_ready)?;
        self.configmaps.wait_until_ready().await.map_err(not_ready)?;
        self.service_accounts.wait_until_ready().await.map_err(not_ready)?;
        self.roles.wait_until_ready().await.map_err(not_ready)?;
        self.role_bindings.wait_until_ready().await.map_err(not_ready)?;
        self.pilots.wait_until_ready().await.map_err(not_ready)?;
        Ok(())
    }

    /// Assemble a `State` reading from these caches.
    pub fn state(&self, client: &Client, recorder: Arc<dyn EventPublisher>) -> State {
        State {
            statefulsets: Arc::new(KubeStore::cached(client.clone(), self.statefulsets.clone())),
            pods: Arc::new(KubeStore::cached(client.clone(), self.pods.clone())),
            services: Arc::new(KubeStore::cached(client.clone(), self.services.clone())),
            configmaps: Arc::new(KubeStore::cached(client.clone(), self.configmaps.clone())),
            service_accounts: Arc::new(KubeStore::cached(
                client.clone(),
                self.service_accounts.clone(),
            )),
            roles: Arc::new(KubeStore::cached(client.clone(), self.roles.clone())),
            role_bindings: Arc::new(KubeStore::cached(
                client.clone(),
                self.role_bindings.clone(),
            )),
            pilots: Arc::new(KubeStore::cached(client.clone(), self.pilots.clone())),
            elasticsearch_clusters: Arc::new(KubeStore::new(client.clone())),
            cassandra_clusters: Arc::new(KubeStore::new(client.clone())),
            recorder,
        }
    }
}

/// Namespaced API, or cluster-wide when `namespace` is `None`.
pub(crate) fn api<K: KubeObject>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn spawn_reflector<K: KubeObject>(api: Api<K>, config: watcher::Config) -> Store<K> {
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, config))
        .default_backoff()
        .for_each(|event| async move {
            if let Err(e) = event {
                debug!(kind = %K::kind(&()), error = %e, "Watch stream error");
            }
        });
    tokio::spawn(stream);
    reader
}
