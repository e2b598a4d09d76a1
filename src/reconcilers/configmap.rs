//! Elasticsearch node configuration.

use super::{converge_field, ensure};
use crate::builders;
use crate::crd::ElasticsearchCluster;
use crate::error::Result;
use crate::state::State;

pub async fn sync(state: &State, cluster: &ElasticsearchCluster) -> Result<()> {
    ensure(
        state,
        state.configmaps.as_ref(),
        cluster,
        builders::elasticsearch::config_map(cluster),
        |live, desired| converge_field(&mut live.data, &desired.data),
    )
    .await
}
