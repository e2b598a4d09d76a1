//! Named, retryable units of mutation.
//!
//! An action holds only its operands. Everything it reads comes from the
//! [`State`] it is executed against, so running it again after a failure (or
//! after success) converges instead of repeating work.

mod create_nodepool;
mod create_pilot;
mod scale;
mod update_version;

pub use create_nodepool::CreateNodePool;
pub use create_pilot::CreatePilot;
pub use scale::{Scale, ScaleIn, ScaleOut};
pub use update_version::UpdateVersion;

use crate::error::{Error, Result};
use crate::kind::ClusterKind;
use crate::ownership::{ensure_owned, namespace_of};
use crate::state::State;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetUpdateStrategy,
};

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, state: &State) -> Result<()>;
}

/// The pool's StatefulSet, refusing one the cluster does not control.
pub(crate) async fn owned_statefulset<C: ClusterKind>(
    state: &State,
    cluster: &C,
    node_pool: &str,
) -> Result<(String, StatefulSet)> {
    let namespace = namespace_of(cluster)?;
    let name = cluster.statefulset_name(node_pool);
    let sts = state
        .statefulsets
        .get(&namespace, &name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "StatefulSet".to_string(),
            name: name.clone(),
        })?;
    ensure_owned(&sts, cluster)?;
    Ok((namespace, sts))
}

/// Replicas the StatefulSet asks for; the API server defaults this to 1.
pub(crate) fn spec_replicas(sts: &StatefulSet) -> i32 {
    sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}

pub(crate) fn ready_replicas(sts: &StatefulSet) -> i32 {
    sts.status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

pub(crate) fn updated_replicas(sts: &StatefulSet) -> i32 {
    sts.status
        .as_ref()
        .and_then(|s| s.updated_replicas)
        .unwrap_or(0)
}

/// Image of the database container, always the first in the template.
pub(crate) fn container_image(sts: &StatefulSet) -> Option<&str> {
    sts.spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .as_deref()
}

pub(crate) fn partition(sts: &StatefulSet) -> Option<i32> {
    sts.spec
        .as_ref()?
        .update_strategy
        .as_ref()?
        .rolling_update
        .as_ref()?
        .partition
}

pub(crate) fn set_partition(sts: &mut StatefulSet, partition: Option<i32>) {
    let Some(spec) = sts.spec.as_mut() else {
        return;
    };
    let strategy = spec
        .update_strategy
        .get_or_insert_with(StatefulSetUpdateStrategy::default);
    strategy.type_ = Some("RollingUpdate".to_string());
    strategy
        .rolling_update
        .get_or_insert_with(RollingUpdateStatefulSetStrategy::default)
        .partition = partition;
}

pub(crate) fn annotation<'a>(sts: &'a StatefulSet, key: &str) -> Option<&'a str> {
    sts.metadata
        .annotations
        .as_ref()?
        .get(key)
        .map(String::as_str)
}

pub(crate) fn set_annotation(sts: &mut StatefulSet, key: &str, value: &str) {
    sts.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}
