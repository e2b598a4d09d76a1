//! Discovery and client Services.

use super::ensure;
use crate::error::Result;
use crate::kind::ClusterKind;
use crate::state::State;
use k8s_openapi::api::core::v1::{Service, ServicePort};

pub async fn sync<C: ClusterKind>(state: &State, cluster: &C) -> Result<()> {
    for desired in cluster.services() {
        ensure(state, state.services.as_ref(), cluster, desired, converge).await?;
    }
    Ok(())
}

/// Selector, ports and not-ready publishing are ours; the API server owns
/// the cluster IP and fills in port defaults.
fn converge(live: &mut Service, desired: &Service) -> bool {
    let (Some(live), Some(desired)) = (live.spec.as_mut(), desired.spec.as_ref()) else {
        return false;
    };

    let mut changed = false;
    if live.selector != desired.selector {
        live.selector = desired.selector.clone();
        changed = true;
    }
    if port_keys(&live.ports) != port_keys(&desired.ports) {
        live.ports = desired.ports.clone();
        changed = true;
    }
    if desired.publish_not_ready_addresses.is_some()
        && live.publish_not_ready_addresses != desired.publish_not_ready_addresses
    {
        live.publish_not_ready_addresses = desired.publish_not_ready_addresses;
        changed = true;
    }
    changed
}

fn port_keys(ports: &Option<Vec<ServicePort>>) -> Vec<(Option<&str>, i32)> {
    ports
        .iter()
        .flatten()
        .map(|p| (p.name.as_deref(), p.port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::state::testing::{cass_cluster, es_cluster, TestState};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    #[tokio::test]
    async fn test_creates_all_services_once() {
        let t = TestState::new();
        let cluster = cass_cluster("3.11.1", 3);
        sync(&t.state, &cluster).await.unwrap();
        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.services.creates(), 3);
        assert_eq!(t.services.writes(), 3);
    }

    #[tokio::test]
    async fn test_server_defaults_are_not_drift() {
        let t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        sync(&t.state, &cluster).await.unwrap();

        let mut svc = t.services.fetch("es-demo").unwrap();
        let spec = svc.spec.as_mut().unwrap();
        spec.cluster_ip = Some("10.0.0.12".to_string());
        for port in spec.ports.iter_mut().flatten() {
            port.protocol = Some("TCP".to_string());
            port.target_port = Some(IntOrString::Int(port.port));
        }
        t.services.insert(svc);

        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.services.updates(), 0);
    }

    #[tokio::test]
    async fn test_selector_drift_is_repaired() {
        let t = TestState::new();
        let cluster = es_cluster("6.1.1", 3);
        sync(&t.state, &cluster).await.unwrap();

        let mut svc = t.services.fetch("es-demo").unwrap();
        svc.spec.as_mut().unwrap().selector = None;
        t.services.insert(svc);

        sync(&t.state, &cluster).await.unwrap();
        assert_eq!(t.services.updates(), 1);
        assert!(t.services.fetch("es-demo").unwrap().spec.unwrap().selector.is_some());
    }

    #[tokio::test]
    async fn test_refuses_foreign_service() {
        let t = TestState::new();
        t.services.insert(Service {
            metadata: ObjectMeta {
                name: Some("es-demo-discovery".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });

        let err = sync(&t.state, &es_cluster("6.1.1", 3)).await.unwrap_err();
        assert!(matches!(err, Error::ForeignOwned { .. }));
        assert_eq!(t.services.writes(), 0);
    }
}
