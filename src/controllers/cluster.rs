//! Cluster Controller
//!
//! Runs the reconcile loop shared by every database kind: watches the
//! cluster, its StatefulSets and its Pilots, drives the kind's [`Reconcile`]
//! implementation and turns failures into Warning events and backoff.

use super::{api, error_policy, forget_deleted, object_key, Context};
use crate::actions::{
    annotation, container_image, partition, ready_replicas, spec_replicas, updated_replicas,
};
use crate::conditions::{
    build_condition, set_condition, CLUSTER_CONDITION_PROGRESSING, CLUSTER_CONDITION_READY,
    CONDITION_FALSE, CONDITION_TRUE,
};
use crate::crd::{ClusterCondition, NodePoolStatus, Pilot};
use crate::error::{Error, Result};
use crate::events::record;
use crate::kind::ClusterKind;
use crate::labels::DEPLOYED_VERSION_ANNOTATION;
use crate::ownership::namespace_of;
use crate::state::State;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Everything one reconcile of a cluster does.
#[async_trait]
pub trait Reconcile: ClusterKind {
    /// Converge owned objects and then record what was observed.
    async fn reconcile(&self, state: &State) -> Result<()>;
}

/// Run the controller for `C` until the process is asked to stop.
pub async fn run<C: Reconcile>(ctx: Arc<Context>) {
    let namespace = ctx.config.namespace.as_deref();
    let clusters = api::<C>(&ctx.client, namespace);
    let statefulsets = api::<StatefulSet>(&ctx.client, namespace);
    let pilots = api::<Pilot>(&ctx.client, namespace);

    info!(kind = %C::kind(&()), workers = ctx.config.workers, "Starting cluster controller");

    Controller::new(clusters, Config::default())
        .owns(statefulsets, Config::default())
        .watches(pilots, Config::default(), cluster_for_pilot::<C>)
        .with_config(controller::Config::default().concurrency(ctx.config.workers))
        .shutdown_on_signal()
        .run(reconcile::<C>, error_policy::<C>, Arc::clone(&ctx))
        .for_each(move |result| {
            forget_deleted(&ctx.backoff, &result);
            match result {
                Ok((obj, _action)) => debug!(cluster = %obj.name, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile loop error"),
            }
            futures::future::ready(())
        })
        .await;

    info!(kind = %C::kind(&()), "Cluster controller stopped");
}

#[instrument(skip_all, fields(cluster = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default()))]
async fn reconcile<C: Reconcile>(cluster: Arc<C>, ctx: Arc<Context>) -> Result<Action> {
    match cluster.reconcile(&ctx.state).await {
        Ok(()) => {
            ctx.backoff.reset(&object_key(cluster.as_ref()));
            Ok(Action::requeue(ctx.config.resync))
        }
        Err(e) => {
            warn!(error = %e, class = ?e.class(), "Reconcile failed");
            record(
                ctx.state.recorder.as_ref(),
                cluster.as_ref(),
                EventType::Warning,
                e.reason(),
                e.to_string(),
            )
            .await;
            Err(e)
        }
    }
}

/// Pilots carry their pod's labels, including the cluster name.
fn cluster_for_pilot<C: ClusterKind>(pilot: Pilot) -> Option<ObjectRef<C>> {
    let name = pilot.labels().get(C::CLUSTER_LABEL)?;
    let namespace = pilot.namespace()?;
    Some(ObjectRef::new(name).within(&namespace))
}

/// What the pools look like right now, gathered for the status write.
#[derive(Debug, Default)]
pub(crate) struct Observation {
    pub node_pools: BTreeMap<String, NodePoolStatus>,
    pub ready: i32,
    pub desired: i32,
    /// Pools whose replicas, image or deployed version still differ from the spec
    pub unsettled: Vec<String>,
}

pub(crate) async fn observe<C: ClusterKind>(state: &State, cluster: &C) -> Result<Observation> {
    let namespace = namespace_of(cluster)?;
    let target = cluster.target_image();
    let mut obs = Observation::default();

    for pool in cluster.node_pool_names() {
        let desired = cluster.node_pool_replicas(&pool).unwrap_or(0);
        let sts = state
            .statefulsets
            .get(&namespace, &cluster.statefulset_name(&pool))
            .await?;
        let ready = sts.as_ref().map(ready_replicas).unwrap_or(0);

        let settled = sts
            .as_ref()
            .is_some_and(|s| matches_spec(cluster, s, desired, &target));
        if !settled {
            obs.unsettled.push(pool.clone());
        }

        obs.ready += ready;
        obs.desired += desired;
        obs.node_pools.insert(pool, NodePoolStatus { ready_replicas: ready });
    }
    Ok(obs)
}

fn matches_spec<C: ClusterKind>(cluster: &C, sts: &StatefulSet, desired: i32, target: &str) -> bool {
    spec_replicas(sts) == desired
        && container_image(sts) == Some(target)
        && annotation(sts, DEPLOYED_VERSION_ANNOTATION) == Some(cluster.version())
}

/// Whether the pool's last resize or upgrade has fully landed.
///
/// Pools are changed one at a time: the control loop leaves later pools alone
/// until this holds for every earlier one.
pub(crate) async fn pool_settled<C: ClusterKind>(
    state: &State,
    cluster: &C,
    pool: &str,
) -> Result<bool> {
    let namespace = namespace_of(cluster)?;
    let Some(sts) = state
        .statefulsets
        .get(&namespace, &cluster.statefulset_name(pool))
        .await?
    else {
        return Ok(false);
    };
    let desired = cluster.node_pool_replicas(pool).unwrap_or(0);
    Ok(matches_spec(cluster, &sts, desired, &cluster.target_image())
        && ready_replicas(&sts) >= desired
        && updated_replicas(&sts) >= desired
        && partition(&sts).unwrap_or(0) == 0)
}

/// Fold the observation into the existing conditions.
pub(crate) fn conditions(existing: &[ClusterCondition], obs: &Observation) -> Vec<ClusterCondition> {
    let mut conditions = existing.to_vec();
    let replicas = format!("{}/{} replicas ready", obs.ready, obs.desired);

    let ready = if obs.ready >= obs.desired {
        build_condition(CLUSTER_CONDITION_READY, CONDITION_TRUE, "AllReplicasReady", &replicas)
    } else {
        build_condition(CLUSTER_CONDITION_READY, CONDITION_FALSE, "ReplicasNotReady", &replicas)
    };
    set_condition(&mut conditions, ready);

    let progressing = if obs.unsettled.is_empty() {
        build_condition(
            CLUSTER_CONDITION_PROGRESSING,
            CONDITION_FALSE,
            "UpToDate",
            "All node pools match the spec",
        )
    } else {
        build_condition(
            CLUSTER_CONDITION_PROGRESSING,
            CONDITION_TRUE,
            "Reconciling",
            &format!("Converging node pools: {}", obs.unsettled.join(", ")),
        )
    };
    set_condition(&mut conditions, progressing);

    conditions
}

/// Status is written whether or not converging succeeded; the converge
/// error wins when both fail.
pub(crate) fn first_error(converge: Result<()>, status: Result<()>) -> Result<()> {
    match (converge, status) {
        (Err(e), Err(status_err)) => {
            warn!(error = %status_err, "Status update failed");
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Whether the pool's StatefulSet exists yet; actions wait for it.
pub(crate) async fn has_statefulset<C: ClusterKind>(
    state: &State,
    cluster: &C,
    pool: &str,
) -> Result<bool> {
    let namespace = namespace_of(cluster)?;
    Ok(state
        .statefulsets
        .get(&namespace, &cluster.statefulset_name(pool))
        .await?
        .is_some())
}

/// Write `status` unless it matches what is already stored.
pub(crate) async fn write_status<C, S>(
    state: &State,
    cluster: &C,
    current: Option<&S>,
    status: S,
    set: impl FnOnce(&mut C, S) + Send,
) -> Result<()>
where
    C: ClusterKind,
    S: PartialEq + Send + Sync,
{
    if current == Some(&status) {
        return Ok(());
    }
    let namespace = namespace_of(cluster)?;
    let mut updated = cluster.clone();
    set(&mut updated, status);
    C::store(state)
        .update_status(&namespace, &updated)
        .await
        .map_err(|e| match e {
            Error::NotFound { .. } => Error::not_ready("cluster was deleted"),
            e => e,
        })?;
    debug!(cluster = %cluster.name_any(), "Updated status");
    Ok(())
}
