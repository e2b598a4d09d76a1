//! Drain-gated replica changes.
//!
//! Growth is one replica per call and only while every current replica is
//! ready. Shrinking removes the highest ordinals first and only once each
//! replica being removed has proven it holds no data; until then the highest
//! undrained replica is asked to decommission and the StatefulSet is left
//! alone.

use super::{owned_statefulset, ready_replicas, spec_replicas, Action};
use crate::crd::Pilot;
use crate::error::{Error, Result};
use crate::events::{reasons, record};
use crate::kind::{ClusterKind, DrainPolicy};
use crate::state::State;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Move a node pool toward `replicas` in either direction.
pub struct Scale<'a, C> {
    pub cluster: &'a C,
    pub node_pool: &'a str,
    pub replicas: i32,
}

/// Grow a node pool toward `replicas`; never shrinks.
pub struct ScaleOut<'a, C> {
    pub cluster: &'a C,
    pub node_pool: &'a str,
    pub replicas: i32,
}

/// Shrink a node pool to `replicas`; never grows.
pub struct ScaleIn<'a, C> {
    pub cluster: &'a C,
    pub node_pool: &'a str,
    pub replicas: i32,
}

#[async_trait]
impl<C: ClusterKind> Action for Scale<'_, C> {
    fn name(&self) -> &'static str {
        "Scale"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let scaler = Scaler::new(self.cluster, self.node_pool, self.replicas)?;
        let (namespace, sts) = owned_statefulset(state, self.cluster, self.node_pool).await?;
        match self.replicas.cmp(&spec_replicas(&sts)) {
            Ordering::Equal => Ok(()),
            Ordering::Greater => scaler.grow(state, &namespace, sts).await,
            Ordering::Less => scaler.shrink(state, &namespace, sts).await,
        }
    }
}

#[async_trait]
impl<C: ClusterKind> Action for ScaleOut<'_, C> {
    fn name(&self) -> &'static str {
        "ScaleOut"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let scaler = Scaler::new(self.cluster, self.node_pool, self.replicas)?;
        let (namespace, sts) = owned_statefulset(state, self.cluster, self.node_pool).await?;
        if self.replicas <= spec_replicas(&sts) {
            return Ok(());
        }
        scaler.grow(state, &namespace, sts).await
    }
}

#[async_trait]
impl<C: ClusterKind> Action for ScaleIn<'_, C> {
    fn name(&self) -> &'static str {
        "ScaleIn"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let scaler = Scaler::new(self.cluster, self.node_pool, self.replicas)?;
        let (namespace, sts) = owned_statefulset(state, self.cluster, self.node_pool).await?;
        if self.replicas >= spec_replicas(&sts) {
            return Ok(());
        }
        scaler.shrink(state, &namespace, sts).await
    }
}

struct Scaler<'a, C> {
    cluster: &'a C,
    node_pool: &'a str,
    replicas: i32,
}

impl<'a, C: ClusterKind> Scaler<'a, C> {
    fn new(cluster: &'a C, node_pool: &'a str, replicas: i32) -> Result<Self> {
        if replicas < 0 {
            return Err(Error::invalid(format!(
                "node pool {node_pool} cannot scale to {replicas} replicas"
            )));
        }
        Ok(Self {
            cluster,
            node_pool,
            replicas,
        })
    }

    async fn grow(&self, state: &State, namespace: &str, sts: StatefulSet) -> Result<()> {
        let current = spec_replicas(&sts);
        let ready = ready_replicas(&sts);
        if ready < current {
            return Err(Error::not_ready(format!(
                "{ready}/{current} replicas of {} ready",
                sts.name_any()
            )));
        }
        self.resize(state, namespace, sts, current + 1).await
    }

    async fn shrink(&self, state: &State, namespace: &str, sts: StatefulSet) -> Result<()> {
        let policy = self.cluster.drain_policy(self.node_pool);
        if policy != DrainPolicy::None {
            let pending = self.drain(state, namespace, &sts, policy).await?;
            if !pending.is_empty() {
                return Err(Error::DrainIncomplete {
                    node_pool: self.node_pool.to_string(),
                    replicas: self.replicas,
                    pending,
                });
            }
        }
        self.resize(state, namespace, sts, self.replicas).await
    }

    /// Names of the replicas above the target that still hold data.
    ///
    /// Only the highest-ordinal undrained replica is asked to decommission.
    async fn drain(
        &self,
        state: &State,
        namespace: &str,
        sts: &StatefulSet,
        policy: DrainPolicy,
    ) -> Result<Vec<String>> {
        let base = sts.name_any();
        let mut pending = Vec::new();

        for ordinal in (self.replicas..spec_replicas(sts)).rev() {
            let name = format!("{base}-{ordinal}");
            let pilot = state.pilots.get(namespace, &name).await?;
            if is_drained(policy, pilot.as_ref()) {
                continue;
            }

            match pilot {
                Some(mut pilot) if pending.is_empty() && !pilot.spec.decommissioned => {
                    pilot.spec.decommissioned = true;
                    state.pilots.update(namespace, &pilot).await?;
                    info!(
                        cluster = %self.cluster.name_any(),
                        %namespace,
                        node_pool = self.node_pool,
                        pilot = %name,
                        "Requested decommission"
                    );
                    record(
                        state.recorder.as_ref(),
                        &pilot,
                        EventType::Normal,
                        reasons::DECOMMISSION_REQUESTED,
                        format!("Requested decommission of {name} before scaling to {}", self.replicas),
                    )
                    .await;
                }
                Some(_) => {}
                None => debug!(pilot = %name, "No pilot yet, treating replica as undrained"),
            }
            pending.push(name);
        }

        Ok(pending)
    }

    async fn resize(
        &self,
        state: &State,
        namespace: &str,
        mut sts: StatefulSet,
        replicas: i32,
    ) -> Result<()> {
        let current = spec_replicas(&sts);
        let name = sts.name_any();
        let Some(spec) = sts.spec.as_mut() else {
            return Err(Error::invalid(format!("StatefulSet {name} has no spec")));
        };
        spec.replicas = Some(replicas);
        state.statefulsets.update(namespace, &sts).await?;

        info!(
            cluster = %self.cluster.name_any(),
            %namespace,
            node_pool = self.node_pool,
            from = current,
            to = replicas,
            target = self.replicas,
            "Scaled node pool"
        );
        record(
            state.recorder.as_ref(),
            self.cluster,
            EventType::Normal,
            reasons::SCALED,
            format!(
                "Scaled node pool {} from {current} to {replicas} replicas",
                self.node_pool
            ),
        )
        .await;
        Ok(())
    }
}

/// Whether a replica about to be removed has handed off its data.
/// A replica without a Pilot has not.
fn is_drained(policy: DrainPolicy, pilot: Option<&Pilot>) -> bool {
    match (policy, pilot) {
        (DrainPolicy::None, _) => true,
        (_, None) => false,
        (DrainPolicy::Documents, Some(p)) => {
            p.elasticsearch_status().and_then(|s| s.documents) == Some(0)
        }
        (DrainPolicy::Decommission, Some(p)) => {
            p.spec.decommissioned && p.cassandra_status().is_some_and(|s| s.decommissioned)
        }
    }
}
