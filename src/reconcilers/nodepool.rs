//! StatefulSet per node pool.
//!
//! The node-pool hash annotation records which spec a StatefulSet was last
//! written from, so a matching hash means there is nothing to do. Replica
//! count and image belong to the scale and upgrade actions; while either
//! differs from the spec the hash update waits for those actions to finish.

use crate::actions::{
    annotation, container_image, partition, set_annotation, set_partition, spec_replicas, Action,
    CreateNodePool,
};
use crate::error::{Error, Result};
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::labels::NODE_POOL_HASH_ANNOTATION;
use crate::ownership::{ensure_owned, is_owned_by, namespace_of};
use crate::state::State;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info, warn};

pub async fn sync<C: ClusterKind>(state: &State, cluster: &C) -> Result<()> {
    let namespace = namespace_of(cluster)?;
    let pools = cluster.node_pool_names();

    for pool in &pools {
        let desired = cluster.statefulset(pool)?;
        let mut matches = state
            .statefulsets
            .list(&namespace, &cluster.node_pool_labels(pool))
            .await?;

        match matches.len() {
            0 => {
                let create = CreateNodePool {
                    cluster,
                    node_pool: pool,
                };
                match create.execute(state).await {
                    Ok(()) => {}
                    Err(Error::AlreadyExists { name, .. }) => {
                        debug!(node_pool = %pool, statefulset = %name, "Already created, waiting for the cache");
                    }
                    Err(e) => return Err(e),
                }
            }
            1 => {
                let live = matches.remove(0);
                ensure_owned(&live, cluster)?;
                update(state, cluster, pool, &namespace, live, desired).await?;
            }
            n => {
                return Err(Error::invalid(format!(
                    "{n} StatefulSets match node pool {pool}"
                )))
            }
        }
    }

    delete_stale(state, cluster, &namespace, &pools).await
}

async fn update<C: ClusterKind>(
    state: &State,
    cluster: &C,
    pool: &str,
    namespace: &str,
    live: StatefulSet,
    desired: StatefulSet,
) -> Result<()> {
    let want = annotation(&desired, NODE_POOL_HASH_ANNOTATION);
    if annotation(&live, NODE_POOL_HASH_ANNOTATION) == want {
        return Ok(());
    }
    let Some(want) = want.map(str::to_string) else {
        return Ok(());
    };

    if spec_replicas(&live) != spec_replicas(&desired)
        || container_image(&live) != container_image(&desired)
    {
        debug!(node_pool = pool, "Deferring node pool update until scale and upgrade settle");
        return Ok(());
    }

    let mut updated = live.clone();
    if let (Some(spec), Some(desired)) = (updated.spec.as_mut(), desired.spec) {
        // Selector, service name, claims and pod management are immutable.
        spec.template = desired.template;
        spec.replicas = desired.replicas;
    }
    set_partition(&mut updated, partition(&live));
    updated.metadata.labels = desired.metadata.labels;
    set_annotation(&mut updated, NODE_POOL_HASH_ANNOTATION, &want);

    state.statefulsets.update(namespace, &updated).await?;
    info!(
        cluster = %cluster.name_any(),
        %namespace,
        node_pool = pool,
        "Updated node pool"
    );
    record(
        state.recorder.as_ref(),
        cluster,
        EventType::Normal,
        reasons::UPDATED,
        format!("Updated node pool {pool}"),
    )
    .await;
    Ok(())
}

/// Remove StatefulSets whose node pool has left the spec.
async fn delete_stale<C: ClusterKind>(
    state: &State,
    cluster: &C,
    namespace: &str,
    pools: &[String],
) -> Result<()> {
    let live = state
        .statefulsets
        .list(namespace, &cluster.cluster_labels())
        .await?;

    for sts in live {
        let Some(pool) = sts.labels().get(C::NODE_POOL_LABEL) else {
            continue;
        };
        if pools.contains(pool) {
            continue;
        }
        let name = sts.name_any();
        if !is_owned_by(&sts.metadata, cluster) {
            warn!(statefulset = %name, "Leaving foreign StatefulSet in place");
            continue;
        }

        state.statefulsets.delete(namespace, &name).await?;
        info!(
            cluster = %cluster.name_any(),
            %namespace,
            node_pool = %pool,
            statefulset = %name,
            "Deleted stale node pool"
        );
        record(
            state.recorder.as_ref(),
            cluster,
            EventType::Normal,
            reasons::DELETED,
            format!("Deleted StatefulSet {name} for removed node pool {pool}"),
        )
        .await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ResourceList;
    use crate::state::testing::{cass_cluster, es_cluster, set_sts_status, StaleCache, TestState};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_creates_missing_pools_once() {
        let t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        sync(&t.state, &cluster).await.unwrap();
        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.statefulsets.creates(), 1);
        assert_eq!(t.statefulsets.writes(), 1);
    }

    #[tokio::test]
    async fn test_create_behind_stale_cache_is_quiet() {
        let mut t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        t.statefulsets.insert(cluster.statefulset("data").unwrap());
        t.state.statefulsets = Arc::new(StaleCache(t.statefulsets.clone()));

        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.statefulsets.writes(), 0);
        assert!(t.events.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_resource_change_updates_template_and_keeps_partition() {
        let t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        sync(&t.state, &cluster).await.unwrap();
        let mut live = t.statefulsets.fetch("es-demo-data").unwrap();
        set_partition(&mut live, Some(1));
        set_sts_status(&mut live, 3, 3);
        t.statefulsets.insert(live);

        let mut changed = cluster.clone();
        changed.spec.node_pools[0].resources.limits = ResourceList {
            cpu: Some("2".to_string()),
            memory: None,
        };
        sync(&t.state, &changed).await.unwrap();
        sync(&t.state, &changed).await.unwrap();

        assert_eq!(t.statefulsets.updates(), 1);
        let live = t.statefulsets.fetch("es-demo-data").unwrap();
        assert_eq!(partition(&live), Some(1));
        assert_eq!(
            annotation(&live, NODE_POOL_HASH_ANNOTATION),
            annotation(
                &changed.statefulset("data").unwrap(),
                NODE_POOL_HASH_ANNOTATION
            )
        );
        let limits = live.spec.unwrap().template.spec.unwrap().containers[0]
            .resources
            .clone()
            .unwrap()
            .limits
            .unwrap();
        assert!(limits.contains_key("cpu"));
    }

    #[tokio::test]
    async fn test_scale_and_upgrade_are_left_to_actions() {
        let t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        sync(&t.state, &cluster).await.unwrap();

        sync(&t.state, &es_cluster("6.1.1", 5)).await.unwrap();
        sync(&t.state, &es_cluster("6.1.2", 3)).await.unwrap();
        assert_eq!(t.statefulsets.updates(), 0);
    }

    #[tokio::test]
    async fn test_foreign_statefulset_is_refused() {
        let t = TestState::new();
        let cluster = cass_cluster("3.11.1", 3);
        let mut sts = cluster.statefulset("ringnodes").unwrap();
        sts.metadata.owner_references = None;
        t.statefulsets.insert(sts);

        let err = sync(&t.state, &cluster).await.unwrap_err();
        assert!(matches!(err, Error::ForeignOwned { .. }));
        assert_eq!(t.statefulsets.writes(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_matches_are_refused() {
        let t = TestState::new();
        let cluster = cass_cluster("3.11.1", 3);
        let sts = cluster.statefulset("ringnodes").unwrap();
        let mut twin = sts.clone();
        twin.metadata.name = Some("cass-demo-ringnodes-copy".to_string());
        t.statefulsets.insert(sts);
        t.statefulsets.insert(twin);

        let err = sync(&t.state, &cluster).await.unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
        assert_eq!(t.statefulsets.writes(), 0);
    }

    #[tokio::test]
    async fn test_removed_pool_is_deleted() {
        let t = TestState::new();
        let mut cluster = es_cluster("6.1.1", 3);
        let mut extra = cluster.spec.node_pools[0].clone();
        extra.name = "ingest".to_string();
        cluster.spec.node_pools.push(extra);
        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.statefulsets.creates(), 2);

        cluster.spec.node_pools.pop();
        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.statefulsets.deletes(), 1);
        assert!(t.statefulsets.fetch("es-demo-ingest").is_none());
        assert!(t.statefulsets.fetch("es-demo-data").is_some());
        assert!(t.events.reasons().contains(&reasons::DELETED.to_string()));
    }
}
