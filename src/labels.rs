//! Well-known labels and annotations.

/// Present (value "true") on every pod that should have a Pilot.
pub const PILOTED_LABEL: &str = "navigator.jetstack.io/has-pilot";

/// Marks Cassandra seed pods.
pub const CASSANDRA_SEED_LABEL: &str = "navigator.jetstack.io/cassandra-seed";

pub const ELASTICSEARCH_CLUSTER_LABEL: &str = "navigator.jetstack.io/elasticsearch-cluster-name";
pub const ELASTICSEARCH_NODE_POOL_LABEL: &str =
    "navigator.jetstack.io/elasticsearch-node-pool-name";
pub const ELASTICSEARCH_ROLE_LABEL_PREFIX: &str = "navigator.jetstack.io/elasticsearch-role-";

pub const CASSANDRA_CLUSTER_LABEL: &str = "navigator.jetstack.io/cassandra-cluster-name";
pub const CASSANDRA_NODE_POOL_LABEL: &str = "navigator.jetstack.io/cassandra-node-pool-name";

pub const APP_LABEL: &str = "app";

/// Content hash of the node pool a StatefulSet was last written from.
pub const NODE_POOL_HASH_ANNOTATION: &str = "navigator.jetstack.io/node-pool-hash";

/// Version every replica of the node pool has confirmed running.
pub const DEPLOYED_VERSION_ANNOTATION: &str = "navigator.jetstack.io/deployed-version";
