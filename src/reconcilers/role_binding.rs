//! RoleBinding tying the pilot ServiceAccount to its Role.

use super::{converge_field, ensure};
use crate::builders;
use crate::error::Result;
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::ownership::{ensure_owned, namespace_of};
use crate::state::State;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::info;

pub async fn sync<C: ClusterKind>(state: &State, cluster: &C) -> Result<()> {
    let desired = builders::role_binding(cluster);
    let namespace = namespace_of(cluster)?;
    let name = desired.name_any();

    if let Some(live) = state.role_bindings.get(&namespace, &name).await? {
        ensure_owned(&live, cluster)?;
        // roleRef cannot be changed in place
        if live.role_ref != desired.role_ref {
            state.role_bindings.delete(&namespace, &name).await?;
            state.role_bindings.create(&namespace, &desired).await?;
            info!(cluster = %cluster.name_any(), %namespace, %name, "Recreated RoleBinding");
            record(
                state.recorder.as_ref(),
                cluster,
                EventType::Normal,
                reasons::UPDATED,
                format!("Recreated RoleBinding {name} with role {}", desired.role_ref.name),
            )
            .await;
            return Ok(());
        }
    }

    ensure(
        state,
        state.role_bindings.as_ref(),
        cluster,
        desired,
        |live, desired| converge_field(&mut live.subjects, &desired.subjects),
    )
    .await
}
