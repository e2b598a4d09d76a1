//! Owner reference and label selector helpers.
//!
//! Every object the controller writes carries a controller owner reference
//! to its cluster (or, for Pilots, its pod). Anything matched by name or
//! selector that lacks that reference is foreign and must not be touched.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Build a controller owner reference pointing at `owner`.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.meta().name.clone().unwrap_or_default(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// True if `meta` names `owner` as its controller.
pub fn is_owned_by<K>(meta: &ObjectMeta, owner: &K) -> bool
where
    K: Resource<DynamicType = ()>,
{
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    meta.owner_references.iter().flatten().any(|r| {
        r.controller == Some(true) && r.uid == uid && r.kind == K::kind(&())
    })
}

/// Refuse to continue unless `obj` is controlled by `owner`.
pub fn ensure_owned<O, K>(obj: &O, owner: &K) -> Result<()>
where
    O: Resource<DynamicType = ()>,
    K: Resource<DynamicType = ()>,
{
    if is_owned_by(obj.meta(), owner) {
        Ok(())
    } else {
        Err(Error::ForeignOwned {
            kind: O::kind(&()).to_string(),
            name: obj.name_any(),
        })
    }
}

/// Namespace of an object read from a namespaced API.
pub fn namespace_of<K>(obj: &K) -> Result<String>
where
    K: Resource<DynamicType = ()>,
{
    obj.namespace()
        .ok_or_else(|| Error::invalid(format!("{} {} has no namespace", K::kind(&()), obj.name_any())))
}

/// Equality-based label selector match.
pub fn matches_labels(meta: &ObjectMeta, selector: &BTreeMap<String, String>) -> bool {
    let labels = meta.labels.as_ref();
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Render a selector as a `key=value,...` list for API queries.
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordinal suffix of a StatefulSet pod (or Pilot) name: `es-demo-data-2` -> 2.
pub fn ordinal(name: &str) -> Option<i32> {
    name.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ElasticsearchCluster, ElasticsearchClusterSpec, ImageSpec};
    use k8s_openapi::api::core::v1::Service;

    fn cluster(uid: &str) -> ElasticsearchCluster {
        let image = ImageSpec {
            repository: "es".to_string(),
            tag: None,
            pull_policy: "IfNotPresent".to_string(),
        };
        let mut c = ElasticsearchCluster::new(
            "demo",
            ElasticsearchClusterSpec {
                version: "6.1.1".to_string(),
                image: image.clone(),
                pilot_image: image,
                node_pools: vec![],
                plugins: vec![],
                sysctls: vec![],
                min_master_nodes: None,
            },
        );
        c.metadata.uid = Some(uid.to_string());
        c
    }

    #[test]
    fn test_owner_reference_round_trip() {
        let owner = cluster("uid-1");
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("es-demo".to_string()),
                owner_references: Some(vec![owner_reference(&owner)]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(is_owned_by(&svc.metadata, &owner));
        assert!(ensure_owned(&svc, &owner).is_ok());
        assert!(!is_owned_by(&svc.metadata, &cluster("uid-2")));
    }

    #[test]
    fn test_foreign_owned_error() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("es-demo".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match ensure_owned(&svc, &cluster("uid-1")) {
            Err(Error::ForeignOwned { kind, name }) => {
                assert_eq!(kind, "Service");
                assert_eq!(name, "es-demo");
            }
            other => panic!("expected foreign owned, got {other:?}"),
        }
    }

    #[test]
    fn test_matches_labels() {
        let meta = ObjectMeta {
            labels: Some(BTreeMap::from([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ])),
            ..Default::default()
        };
        assert!(matches_labels(&meta, &BTreeMap::from([("a".to_string(), "1".to_string())])));
        assert!(!matches_labels(&meta, &BTreeMap::from([("a".to_string(), "2".to_string())])));
        assert!(!matches_labels(&ObjectMeta::default(), &BTreeMap::from([("a".to_string(), "1".to_string())])));
        assert_eq!(
            selector_string(meta.labels.as_ref().unwrap()),
            "a=1,b=2"
        );
    }

    #[test]
    fn test_namespace_of() {
        let mut c = cluster("uid-1");
        assert!(matches!(namespace_of(&c), Err(Error::Invalid(_))));
        c.metadata.namespace = Some("db".to_string());
        assert_eq!(namespace_of(&c).unwrap(), "db");
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal("es-demo-data-2"), Some(2));
        assert_eq!(ordinal("data-10"), Some(10));
        assert_eq!(ordinal("data"), None);
    }
}
