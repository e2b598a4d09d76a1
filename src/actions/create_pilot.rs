use super::Action;
use crate::crd::{Pilot, PilotSpec};
use crate::error::{Error, Result};
use crate::events::{reasons, record};
use crate::ownership::{namespace_of, owner_reference};
use crate::state::State;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, info};

/// Mint the Pilot for a piloted pod.
///
/// The Pilot shares the pod's name and labels and is owned by the pod, so it
/// is garbage collected with it.
pub struct CreatePilot<'a> {
    pub pod: &'a Pod,
}

impl CreatePilot<'_> {
    fn pilot(&self, namespace: String) -> Pilot {
        Pilot {
            metadata: ObjectMeta {
                name: Some(self.pod.name_any()),
                namespace: Some(namespace),
                labels: self.pod.metadata.labels.clone(),
                owner_references: Some(vec![owner_reference(self.pod)]),
                ..Default::default()
            },
            spec: PilotSpec::default(),
            status: None,
        }
    }
}

#[async_trait]
impl Action for CreatePilot<'_> {
    fn name(&self) -> &'static str {
        "CreatePilot"
    }

    async fn execute(&self, state: &State) -> Result<()> {
        let namespace = namespace_of(self.pod)?;
        let pilot = self.pilot(namespace.clone());

        match state.pilots.create(&namespace, &pilot).await {
            Ok(created) => {
                info!(%namespace, pilot = %created.name_any(), "Created pilot");
                record(
                    state.recorder.as_ref(),
                    &created,
                    EventType::Normal,
                    reasons::CREATED,
                    format!("Created pilot for pod {}", self.pod.name_any()),
                )
                .await;
                Ok(())
            }
            Err(Error::AlreadyExists { name, .. }) => {
                debug!(%namespace, pilot = %name, "Pilot created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
