//! Pilot Controller
//!
//! Makes sure every piloted pod has a Pilot resource of the same name.

use super::{api, error_policy, forget_deleted, object_key, Context};
use crate::actions::{Action as _, CreatePilot};
use crate::crd::Pilot;
use crate::error::Result;
use crate::labels::PILOTED_LABEL;
use crate::state::State;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Run the Pilot controller until the process is asked to stop.
pub async fn run(ctx: Arc<Context>) {
    let namespace = ctx.config.namespace.as_deref();
    let pods = api::<Pod>(&ctx.client, namespace);
    let pilots = api::<Pilot>(&ctx.client, namespace);

    info!(workers = ctx.config.workers, "Starting pilot controller");

    Controller::new(pods, Config::default().labels(&format!("{PILOTED_LABEL}=true")))
        .owns(pilots, Config::default())
        .with_config(controller::Config::default().concurrency(ctx.config.workers))
        .shutdown_on_signal()
        .run(reconcile_pod, error_policy::<Pod>, Arc::clone(&ctx))
        .for_each(move |result| {
            forget_deleted(&ctx.backoff, &result);
            match result {
                Ok((obj, _action)) => debug!(pod = %obj.name, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile loop error"),
            }
            futures::future::ready(())
        })
        .await;

    info!("Pilot controller stopped");
}

#[instrument(skip_all, fields(pod = %pod.name_any(), namespace = %pod.namespace().unwrap_or_default()))]
async fn reconcile_pod(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = pod.namespace().unwrap_or_default();
    sync(&ctx.state, &namespace, &pod.name_any()).await?;
    ctx.backoff.reset(&object_key(pod.as_ref()));
    Ok(Action::await_change())
}

/// Create the Pilot for pod `namespace/name` if it should have one.
pub async fn sync(state: &State, namespace: &str, name: &str) -> Result<()> {
    let Some(pod) = state.pods.get(namespace, name).await? else {
        debug!(%namespace, pod = name, "Pod is gone");
        return Ok(());
    };
    if pod.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }
    if pod.labels().get(PILOTED_LABEL).map(String::as_str) != Some("true") {
        return Ok(());
    }
    if state.pilots.get(namespace, name).await?.is_some() {
        return Ok(());
    }
    CreatePilot { pod: &pod }.execute(state).await
}
