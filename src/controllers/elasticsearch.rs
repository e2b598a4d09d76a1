//! ElasticsearchCluster reconcile.

use super::cluster::{
    conditions, first_error, has_statefulset, observe, pool_settled, write_status, Reconcile,
};
use crate::actions::{Action, Scale, UpdateVersion};
use crate::crd::{
    ElasticsearchCluster, ElasticsearchClusterStatus, ElasticsearchRole, Health, NodePoolStatus,
};
use crate::error::Result;
use crate::kind::ClusterKind;
use crate::ownership::namespace_of;
use crate::reconcilers::{configmap, nodepool, role, role_binding, service, service_account};
use crate::state::State;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[async_trait]
impl Reconcile for ElasticsearchCluster {
    async fn reconcile(&self, state: &State) -> Result<()> {
        let converged = converge(state, self).await;
        let status = update_status(state, self).await;
        first_error(converged, status)
    }
}

async fn converge(state: &State, cluster: &ElasticsearchCluster) -> Result<()> {
    service_account::sync(state, cluster).await?;
    role::sync(state, cluster).await?;
    role_binding::sync(state, cluster).await?;
    service::sync(state, cluster).await?;
    configmap::sync(state, cluster).await?;
    nodepool::sync(state, cluster).await?;

    for pool in &cluster.spec.node_pools {
        if !has_statefulset(state, cluster, &pool.name).await? {
            debug!(node_pool = %pool.name, "StatefulSet not cached yet");
            break;
        }
        let scale = Scale {
            cluster,
            node_pool: &pool.name,
            replicas: pool.replicas,
        };
        debug!(action = scale.name(), node_pool = %pool.name, "Executing");
        scale.execute(state).await?;

        let upgrade = UpdateVersion {
            cluster,
            node_pool: &pool.name,
        };
        debug!(action = upgrade.name(), node_pool = %pool.name, "Executing");
        upgrade.execute(state).await?;

        if !pool_settled(state, cluster, &pool.name).await? {
            info!(node_pool = %pool.name, "Holding remaining node pools until this one settles");
            break;
        }
    }
    Ok(())
}

async fn update_status(state: &State, cluster: &ElasticsearchCluster) -> Result<()> {
    let obs = observe(state, cluster).await?;
    let namespace = namespace_of(cluster)?;
    let pilots = state
        .pilots
        .list(&namespace, &cluster.cluster_labels())
        .await?;
    let reported = pilots
        .iter()
        .filter_map(|p| p.elasticsearch_status()?.cluster_health)
        .max();

    let existing = cluster.status.as_ref();
    let status = ElasticsearchClusterStatus {
        health: Some(health(cluster, &obs.node_pools, reported)),
        conditions: conditions(
            existing.map(|s| s.conditions.as_slice()).unwrap_or_default(),
            &obs,
        ),
        node_pools: obs.node_pools,
    };
    write_status(state, cluster, existing, status, |c, s| c.status = Some(s)).await
}

/// Red when a data or master pool has no ready replicas, or any pilot says
/// so; Yellow while any pool is short of replicas; otherwise Green.
fn health(
    cluster: &ElasticsearchCluster,
    pools: &BTreeMap<String, NodePoolStatus>,
    reported: Option<Health>,
) -> Health {
    let observed = cluster
        .spec
        .node_pools
        .iter()
        .map(|pool| {
            let ready = pools.get(&pool.name).map_or(0, |s| s.ready_replicas);
            let critical =
                pool.has_role(ElasticsearchRole::Data) || pool.has_role(ElasticsearchRole::Master);
            if pool.replicas > 0 && ready == 0 && critical {
                Health::Red
            } else if ready < pool.replicas {
                Health::Yellow
            } else {
                Health::Green
            }
        })
        .max()
        .unwrap_or(Health::Green);
    observed.max(reported.unwrap_or(Health::Green))
}
