//! Per-resource-kind reconcilers.
//!
//! Each `sync` builds the desired object, looks it up by its deterministic
//! name and then creates it, leaves it alone, or updates the fields the
//! controller owns. Objects without the cluster's controller reference are
//! never written.

pub mod configmap;
pub mod nodepool;
pub mod role;
pub mod role_binding;
pub mod seed_labeller;
pub mod service;
pub mod service_account;

use crate::error::{Error, Result};
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::ownership::{ensure_owned, namespace_of};
use crate::state::{KubeObject, ObjectStore, State};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info};

/// Create `desired` if absent; otherwise let `converge` pull the live copy
/// toward it and write the result if anything changed.
pub(crate) async fn ensure<C, K, F>(
    state: &State,
    store: &dyn ObjectStore<K>,
    cluster: &C,
    desired: K,
    converge: F,
) -> Result<()>
where
    C: ClusterKind,
    K: KubeObject,
    F: FnOnce(&mut K, &K) -> bool + Send,
{
    let namespace = namespace_of(cluster)?;
    let name = desired.name_any();
    let kind = K::kind(&());

    let Some(existing) = store.get(&namespace, &name).await? else {
        match store.create(&namespace, &desired).await {
            Ok(_) => {}
            Err(Error::AlreadyExists { .. }) => {
                debug!(%namespace, %kind, %name, "Already created, waiting for the cache");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        info!(cluster = %cluster.name_any(), %namespace, %kind, %name, "Created");
        record(
            state.recorder.as_ref(),
            cluster,
            EventType::Normal,
            reasons::CREATED,
            format!("Created {kind} {name}"),
        )
        .await;
        return Ok(());
    };

    ensure_owned(&existing, cluster)?;

    let mut updated = existing.clone();
    if !converge(&mut updated, &desired) {
        debug!(%kind, %name, "Up to date");
        return Ok(());
    }

    store.update(&namespace, &updated).await?;
    info!(cluster = %cluster.name_any(), %namespace, %kind, %name, "Updated");
    record(
        state.recorder.as_ref(),
        cluster,
        EventType::Normal,
        reasons::UPDATED,
        format!("Updated {kind} {name}"),
    )
    .await;
    Ok(())
}

/// Replace `live` with `desired` when they differ.
pub(crate) fn converge_field<T: PartialEq + Clone>(live: &mut T, desired: &T) -> bool {
    if live == desired {
        return false;
    }
    *live = desired.clone();
    true
}
