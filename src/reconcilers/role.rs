//! Role granting the pilot access to its own Pilot resource.

use super::{converge_field, ensure};
use crate::builders;
use crate::error::Result;
use crate::kind::ClusterKind;
use crate::state::State;

pub async fn sync<C: ClusterKind>(state: &State, cluster: &C) -> Result<()> {
    ensure(
        state,
        state.roles.as_ref(),
        cluster,
        builders::role(cluster),
        |live, desired| converge_field(&mut live.rules, &desired.rules),
    )
    .await
}
