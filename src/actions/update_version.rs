//! Partitioned rolling upgrade of one node pool.
//!
//! The first call swaps the pod template and pins the partition to the
//! highest ordinal, so exactly one replica is replaced. Each later call lowers
//! the partition by one, but only after the platform counts the replica as
//! updated and its pilot reports the target version. When every pilot reports
//! it, the deployed-version annotation is written and the upgrade is done.

use super::{
    annotation, container_image, owned_statefulset, partition, ready_replicas, set_annotation,
    set_partition, spec_replicas, updated_replicas, Action,
};
use crate::crd::Health;
use crate::error::{Error, Result};
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::labels::DEPLOYED_VERSION_ANNOTATION;
use crate::state::State;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info};

pub struct UpdateVersion<'a, C> {
    pub cluster: &'a C,
    pub node_pool: &'a str,
}

#[async_trait]
impl<C: ClusterKind> Action for UpdateVersion<'_, C> {
    fn name(&self) -> &'static str {
        "UpdateVersion"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let (namespace, sts) = owned_statefulset(state, self.cluster, self.node_pool).await?;
        let desired = self
            .cluster
            .node_pool_replicas(self.node_pool)
            .ok_or_else(|| Error::invalid(format!("unknown node pool {}", self.node_pool)))?;
        let version = self.cluster.version();
        let image_current =
            container_image(&sts) == Some(self.cluster.target_image().as_str());

        if image_current && annotation(&sts, DEPLOYED_VERSION_ANNOTATION) == Some(version) {
            return Ok(());
        }

        if self.cluster.health() == Some(Health::Red) {
            return Err(Error::not_ready(format!(
                "cluster health is red, holding upgrade of {}",
                sts.name_any()
            )));
        }
        let ready = ready_replicas(&sts);
        if spec_replicas(&sts) != desired || ready < desired {
            return Err(Error::not_ready(format!(
                "{ready}/{desired} replicas of {} ready, holding upgrade",
                sts.name_any()
            )));
        }

        if !image_current {
            return self.begin(state, &namespace, sts, desired).await;
        }
        self.advance(state, &namespace, sts, desired).await
    }
}

impl<C: ClusterKind> UpdateVersion<'_, C> {
    /// Swap in the new template with only the highest ordinal unlocked.
    async fn begin(
        &self,
        state: &State,
        namespace: &str,
        mut sts: StatefulSet,
        desired: i32,
    ) -> Result<()> {
        let fresh = self.cluster.statefulset(self.node_pool)?;
        let first = (desired - 1).max(0);
        if let (Some(live), Some(fresh)) = (sts.spec.as_mut(), fresh.spec) {
            live.template = fresh.template;
        }
        set_partition(&mut sts, Some(first));
        state.statefulsets.update(namespace, &sts).await?;

        let replica = format!("{}-{first}", sts.name_any());
        info!(
            cluster = %self.cluster.name_any(),
            %namespace,
            node_pool = self.node_pool,
            version = self.cluster.version(),
            partition = first,
            "Started rolling upgrade"
        );
        record(
            state.recorder.as_ref(),
            self.cluster,
            EventType::Normal,
            reasons::UPGRADING,
            format!(
                "Upgrading node pool {} to {}, starting with {replica}",
                self.node_pool,
                self.cluster.version()
            ),
        )
        .await;
        Ok(())
    }

    async fn advance(
        &self,
        state: &State,
        namespace: &str,
        mut sts: StatefulSet,
        desired: i32,
    ) -> Result<()> {
        let base = sts.name_any();
        let version = self.cluster.version();
        let live_partition = partition(&sts).unwrap_or(0);
        let updated = updated_replicas(&sts);

        let mut lagging = Vec::new();
        for ordinal in (0..desired).rev() {
            let pilot = state
                .pilots
                .get(namespace, &format!("{base}-{ordinal}"))
                .await?;
            if pilot.as_ref().and_then(|p| C::pilot_version(p)) != Some(version) {
                lagging.push(ordinal);
            }
        }

        if let Some(ordinal) = lagging.iter().find(|o| **o >= live_partition) {
            info!(
                node_pool = self.node_pool,
                replica = %format!("{base}-{ordinal}"),
                version,
                "Waiting for replica to report new version"
            );
            return Ok(());
        }

        let next = desired - updated - 1;
        if next >= 0 && next < live_partition {
            set_partition(&mut sts, Some(next));
            state.statefulsets.update(namespace, &sts).await?;
            info!(
                cluster = %self.cluster.name_any(),
                %namespace,
                node_pool = self.node_pool,
                from = live_partition,
                to = next,
                "Lowered upgrade partition"
            );
            record(
                state.recorder.as_ref(),
                self.cluster,
                EventType::Normal,
                reasons::UPGRADING,
                format!("Upgrading {base}-{next} to {version}"),
            )
            .await;
            return Ok(());
        }

        if !lagging.is_empty() || updated < desired {
            debug!(
                node_pool = self.node_pool,
                updated,
                partition = live_partition,
                "Upgrade in progress"
            );
            return Ok(());
        }

        set_annotation(&mut sts, DEPLOYED_VERSION_ANNOTATION, version);
        state.statefulsets.update(namespace, &sts).await?;
        info!(
            cluster = %self.cluster.name_any(),
            %namespace,
            node_pool = self.node_pool,
            version,
            "Node pool upgraded"
        );
        record(
            state.recorder.as_ref(),
            self.cluster,
            EventType::Normal,
            reasons::UPGRADED,
            format!("Node pool {} is running {version}", self.node_pool),
        )
        .await;
        Ok(())
    }
}
