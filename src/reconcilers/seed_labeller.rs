//! Marks the lowest ordinals of every Cassandra node pool as seeds.

use crate::crd::CassandraCluster;
use crate::error::Result;
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::labels::CASSANDRA_SEED_LABEL;
use crate::ownership::{namespace_of, ordinal};
use crate::state::State;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::info;

pub async fn sync(state: &State, cluster: &CassandraCluster) -> Result<()> {
    let namespace = namespace_of(cluster)?;

    for pool in &cluster.spec.node_pools {
        let pods = state
            .pods
            .list(&namespace, &cluster.node_pool_labels(&pool.name))
            .await?;

        for mut pod in pods {
            let want_seed = ordinal(&pod.name_any()).is_some_and(|o| o < pool.seeds);
            let is_seed = pod.labels().get(CASSANDRA_SEED_LABEL).map(String::as_str) == Some("true");
            if want_seed == is_seed {
                continue;
            }

            if want_seed {
                pod.labels_mut()
                    .insert(CASSANDRA_SEED_LABEL.to_string(), "true".to_string());
            } else {
                pod.labels_mut().remove(CASSANDRA_SEED_LABEL);
            }
            state.pods.update(&namespace, &pod).await?;

            let name = pod.name_any();
            info!(
                cluster = %cluster.name_any(),
                %namespace,
                pod = %name,
                seed = want_seed,
                "Relabelled pod"
            );
            record(
                state.recorder.as_ref(),
                cluster,
                EventType::Normal,
                reasons::SEED_LABELLED,
                if want_seed {
                    format!("Marked {name} as a seed")
                } else {
                    format!("Removed seed label from {name}")
                },
            )
            .await;
        }
    }
    Ok(())
}
