//! Controllers for the Navigator operator
//!
//! Each controller watches its primary resource and reconciles live state
//! toward it. They share one [`Context`] built at startup and are started by
//! name from the [`Registry`].

pub mod backoff;
pub mod cassandra;
pub mod cluster;
pub mod elasticsearch;
pub mod pilot;

pub use backoff::Backoff;

use crate::config::OperatorConfig;
use crate::crd::{CassandraCluster, ElasticsearchCluster};
use crate::error::{Error, Result};
use crate::state::{api, State};
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dependencies handed to every controller.
pub struct Context {
    pub client: Client,
    pub state: State,
    pub config: OperatorConfig,
    pub backoff: Backoff,
}

impl Context {
    pub fn new(client: Client, state: State, config: OperatorConfig) -> Self {
        let backoff = Backoff::new(config.min_backoff, config.max_backoff);
        Self {
            client,
            state,
            config,
            backoff,
        }
    }
}

type Start = fn(Arc<Context>) -> BoxFuture<'static, ()>;

/// Controllers the binary can run, keyed by the name used on the command line.
pub struct Registry {
    controllers: BTreeMap<&'static str, Start>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut controllers: BTreeMap<&'static str, Start> = BTreeMap::new();
        controllers.insert("elasticsearch", |ctx| {
            cluster::run::<ElasticsearchCluster>(ctx).boxed()
        });
        controllers.insert("cassandra", |ctx| cluster::run::<CassandraCluster>(ctx).boxed());
        controllers.insert("pilot", |ctx| pilot::run(ctx).boxed());
        Self { controllers }
    }
}

impl Registry {
    pub fn names(&self) -> Vec<&'static str> {
        self.controllers.keys().copied().collect()
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<(&'static str, Start)>> {
        names
            .iter()
            .map(|name| {
                self.controllers
                    .get_key_value(name.as_str())
                    .map(|(k, start)| (*k, *start))
                    .ok_or_else(|| {
                        Error::invalid(format!(
                            "unknown controller {name}, expected one of {}",
                            self.names().join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Spawn the named controllers. Nothing starts if any name is unknown.
    pub fn start(
        &self,
        names: &[String],
        ctx: Arc<Context>,
    ) -> Result<Vec<(&'static str, JoinHandle<()>)>> {
        let selected = self.resolve(names)?;
        Ok(selected
            .into_iter()
            .map(|(name, start)| {
                info!(controller = name, "Starting controller");
                (name, tokio::spawn(start(Arc::clone(&ctx))))
            })
            .collect())
    }
}

/// Backoff key: `kind/namespace/name`. The kind keeps controllers sharing one
/// [`Backoff`] apart.
fn backoff_key(kind: &str, namespace: Option<&str>, name: &str) -> String {
    format!("{kind}/{}/{name}", namespace.unwrap_or_default())
}

pub(crate) fn object_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    backoff_key(&K::kind(&()), obj.namespace().as_deref(), &obj.name_any())
}

/// Drop the retry history of an object the controller found deleted.
pub(crate) fn forget_deleted<K, Q>(
    backoff: &Backoff,
    result: &std::result::Result<(ObjectRef<K>, Action), controller::Error<Error, Q>>,
) where
    K: Resource,
    Q: std::error::Error + 'static,
{
    if let Err(controller::Error::ObjectNotFound(reference)) = result {
        let key = backoff_key(
            &reference.dyntype.kind,
            reference.namespace.as_deref(),
            &reference.name,
        );
        debug!(object = %key, "Object is gone, forgetting its backoff");
        backoff.reset(&key);
    }
}

/// Requeue after a failed reconcile, with the delay chosen by the error's class.
pub(crate) fn error_policy<K: Resource<DynamicType = ()>>(
    obj: Arc<K>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let key = object_key(obj.as_ref());
    let delay = ctx.backoff.next(&key, error.class());
    warn!(object = %key, error = %error, delay_ms = delay.as_millis() as u64, "Requeueing");
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::state::testing::{cass_cluster, es_cluster};
    use kube::runtime::watcher;
    use std::time::Duration;

    #[test]
    fn test_registry_names() {
        assert_eq!(
            Registry::default().names(),
            vec!["cassandra", "elasticsearch", "pilot"]
        );
    }

    #[test]
    fn test_registry_rejects_unknown_controller() {
        let registry = Registry::default();
        let ok = registry
            .resolve(&["pilot".to_string(), "elasticsearch".to_string()])
            .unwrap();
        assert_eq!(ok.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec!["pilot", "elasticsearch"]);

        let err = registry
            .resolve(&["pilot".to_string(), "redis".to_string()])
            .err()
            .unwrap();
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn test_object_key_includes_kind() {
        let es = es_cluster("6.1.1", 3);
        let cass = cass_cluster("3.11.2", 3);
        assert_eq!(object_key(&es), "ElasticsearchCluster/default/demo");
        assert_eq!(object_key(&cass), "CassandraCluster/default/demo");
    }

    #[test]
    fn test_same_name_different_kind_keep_separate_backoff() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        let es = object_key(&es_cluster("6.1.1", 3));
        let cass = object_key(&cass_cluster("3.11.2", 3));
        for _ in 0..5 {
            backoff.next(&es, ErrorClass::Retryable);
        }
        backoff.reset(&cass);
        assert!(backoff.next(&es, ErrorClass::Retryable) >= Duration::from_millis(1600));
    }

    #[test]
    fn test_deleted_object_backoff_is_forgotten() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        let key = object_key(&es_cluster("6.1.1", 3));
        for _ in 0..5 {
            backoff.next(&key, ErrorClass::Retryable);
        }

        let gone: std::result::Result<
            (ObjectRef<ElasticsearchCluster>, Action),
            controller::Error<Error, watcher::Error>,
        > = Err(controller::Error::ObjectNotFound(
            ObjectRef::<ElasticsearchCluster>::new("demo")
                .within("default")
                .erase(),
        ));
        forget_deleted(&backoff, &gone);
        assert!(backoff.next(&key, ErrorClass::Retryable) <= Duration::from_millis(150));
    }
}
