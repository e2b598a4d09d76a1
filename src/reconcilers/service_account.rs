//! ServiceAccount the pilot runs as.

use super::ensure;
use crate::builders;
use crate::error::Result;
use crate::kind::ClusterKind;
use crate::state::State;

/// A ServiceAccount carries nothing the controller needs to keep in sync,
/// so an owned one is left untouched.
pub async fn sync<C: ClusterKind>(state: &State, cluster: &C) -> Result<()> {
    ensure(
        state,
        state.service_accounts.as_ref(),
        cluster,
        builders::service_account(cluster),
        |_, _| false,
    )
    .await
}
