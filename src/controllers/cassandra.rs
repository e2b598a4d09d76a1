//! CassandraCluster reconcile.

use super::cluster::{conditions, first_error, observe, pool_settled, write_status, Reconcile};
use crate::actions::{spec_replicas, Action, ScaleIn, ScaleOut, UpdateVersion};
use crate::crd::{CassandraCluster, CassandraClusterStatus};
use crate::error::Result;
use crate::kind::ClusterKind;
use crate::ownership::namespace_of;
use crate::reconcilers::{nodepool, role, role_binding, seed_labeller, service, service_account};
use crate::state::State;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
impl Reconcile for CassandraCluster {
    async fn reconcile(&self, state: &State) -> Result<()> {
        let converged = converge(state, self).await;
        let status = update_status(state, self).await;
        first_error(converged, status)
    }
}

async fn converge(state: &State, cluster: &CassandraCluster) -> Result<()> {
    service_account::sync(state, cluster).await?;
    role::sync(state, cluster).await?;
    role_binding::sync(state, cluster).await?;
    service::sync(state, cluster).await?;
    nodepool::sync(state, cluster).await?;

    let namespace = namespace_of(cluster)?;
    for pool in &cluster.spec.node_pools {
        let Some(sts) = state
            .statefulsets
            .get(&namespace, &cluster.statefulset_name(&pool.name))
            .await?
        else {
            debug!(node_pool = %pool.name, "StatefulSet not cached yet");
            break;
        };

        if pool.replicas > spec_replicas(&sts) {
            ScaleOut {
                cluster,
                node_pool: &pool.name,
                replicas: pool.replicas,
            }
            .execute(state)
            .await?;
        } else if pool.replicas < spec_replicas(&sts) {
            ScaleIn {
                cluster,
                node_pool: &pool.name,
                replicas: pool.replicas,
            }
            .execute(state)
            .await?;
        }

        UpdateVersion {
            cluster,
            node_pool: &pool.name,
        }
        .execute(state)
        .await?;

        if !pool_settled(state, cluster, &pool.name).await? {
            info!(node_pool = %pool.name, "Holding remaining node pools until this one settles");
            break;
        }
    }

    seed_labeller::sync(state, cluster).await
}

async fn update_status(state: &State, cluster: &CassandraCluster) -> Result<()> {
    let obs = observe(state, cluster).await?;
    let existing = cluster.status.as_ref();
    let status = CassandraClusterStatus {
        conditions: conditions(
            existing.map(|s| s.conditions.as_slice()).unwrap_or_default(),
            &obs,
        ),
        node_pools: obs.node_pools,
    };
    write_status(state, cluster, existing, status, |c, s| c.status = Some(s)).await
}
