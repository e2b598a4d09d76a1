//! Kubernetes Event recording.
//!
//! Events are fire-and-forget: a failed publish is logged and never
//! propagates into reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Reporting component shown on every event
pub const REPORTER: &str = "navigator-controller";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    );
}

/// Publish an event against `obj`, using `reason` as the action too.
pub async fn record<K>(
    publisher: &dyn EventPublisher,
    obj: &K,
    type_: EventType,
    reason: &str,
    note: String,
) where
    K: Resource<DynamicType = ()>,
{
    publisher
        .publish(&obj.object_ref(&()), type_, reason, reason, note)
        .await;
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: REPORTER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, reference).await {
            warn!(reason, action, error = %e, "Failed to publish event");
        }
    }
}

/// Event reasons emitted by the controllers.
pub mod reasons {
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
    pub const DELETED: &str = "Deleted";
    pub const SCALED: &str = "Scaled";
    pub const DECOMMISSION_REQUESTED: &str = "DecommissionRequested";
    pub const UPGRADING: &str = "Upgrading";
    pub const UPGRADED: &str = "Upgraded";
    pub const SEED_LABELLED: &str = "SeedLabelled";
}
