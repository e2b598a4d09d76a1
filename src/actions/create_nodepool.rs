use super::Action;
use crate::error::Result;
use crate::events::{reasons, record};
use crate::kind::ClusterKind;
use crate::ownership::namespace_of;
use crate::state::State;
use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::info;

/// Create the StatefulSet for a node pool that has none yet.
pub struct CreateNodePool<'a, C> {
    pub cluster: &'a C,
    pub node_pool: &'a str,
}

#[async_trait]
impl<C: ClusterKind> Action for CreateNodePool<'_, C> {
    fn name(&self) -> &'static str {
        "CreateNodePool"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let namespace = namespace_of(self.cluster)?;
        let sts = self.cluster.statefulset(self.node_pool)?;
        let name = sts.name_any();

        state.statefulsets.create(&namespace, &sts).await?;

        info!(
            cluster = %self.cluster.name_any(),
            %namespace,
            node_pool = self.node_pool,
            statefulset = %name,
            "Created node pool"
        );
        record(
            state.recorder.as_ref(),
            self.cluster,
            EventType::Normal,
            reasons::CREATED,
            format!("Created node pool {} (StatefulSet {name})", self.node_pool),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::labels::NODE_POOL_HASH_ANNOTATION;
    use crate::ownership::is_owned_by;
    use crate::state::testing::{cass_cluster, TestState};

    #[tokio::test]
    async fn test_creates_owned_statefulset() {
        let t = TestState::new();
        let cluster = cass_cluster("3.11.1", 3);
        let action = CreateNodePool {
            cluster: &cluster,
            node_pool: "ringnodes",
        };
        assert_eq!(action.name(), "CreateNodePool");

        action.execute(&t.state).await.unwrap();

        let sts = t.statefulsets.fetch("cass-demo-ringnodes").unwrap();
        assert!(is_owned_by(&sts.metadata, &cluster));
        assert!(sts
            .metadata
            .annotations
            .unwrap()
            .contains_key(NODE_POOL_HASH_ANNOTATION));
        assert_eq!(t.events.reasons(), vec![reasons::CREATED.to_string()]);
    }

    #[tokio::test]
    async fn test_existing_statefulset_is_reported() {
        let t = TestState::new();
        let cluster = cass_cluster("3.11.1", 3);
        let action = CreateNodePool {
            cluster: &cluster,
            node_pool: "ringnodes",
        };
        action.execute(&t.state).await.unwrap();

        let err = action.execute(&t.state).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(t.statefulsets.creates(), 1);
    }
}
