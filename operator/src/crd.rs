//! The `MongoClusterConfiguration` custom resource definition.
//!
//! Mirrors the attributes the source's `V1MongoClusterConfiguration` dict
//! model accepted, but as an explicit, schema-validated struct instead of a
//! dynamic attribute bag with pascal/snake conversion at every boundary
//! crossing (see the re-architecture note in the design ledger).

use garde::Validate;
use kube::CustomResource;
use operator_api::consts::{MAX_REPLICAS, MIN_REPLICAS};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `MongoClusterConfiguration` — the user-facing declaration of a desired
/// MongoDB replica-set cluster.
#[derive(CustomResource, Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "mongodb.com",
    version = "v1alpha1",
    kind = "MongoClusterConfiguration",
    plural = "mongoclusterconfigurations",
    shortname = "mongo",
    namespaced,
    status = "MongoClusterStatus"
)]
pub struct MongoClusterConfigurationSpec {
    #[garde(dive)]
    pub mongodb: MongoDbSpec,
    #[garde(dive)]
    pub backups: Option<BackupsSpec>,
}

/// Desired topology and container sizing for the replica set.
#[derive(Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct MongoDbSpec {
    #[garde(range(min = MIN_REPLICAS, max = MAX_REPLICAS))]
    pub replicas: i32,
    #[garde(skip)]
    pub cpu_limit: Option<String>,
    #[garde(skip)]
    pub cpu_request: Option<String>,
    #[garde(skip)]
    pub memory_limit: Option<String>,
    #[garde(skip)]
    pub memory_request: Option<String>,
    #[garde(skip)]
    pub storage_class_name: Option<String>,
    #[garde(skip)]
    pub storage_name: Option<String>,
    #[garde(skip)]
    pub storage_size: Option<String>,
    #[garde(skip)]
    pub storage_data_path: Option<String>,
    #[garde(skip)]
    pub wired_tiger_cache_size: Option<String>,
}

/// Backup policy: schedule, destination bucket, and optional restore hint.
#[derive(Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct BackupsSpec {
    #[garde(length(min = 1))]
    pub cron: String,
    #[garde(dive)]
    pub gcs: GcsSpec,
}

/// GCS bucket configuration and the service-account credentials used to
/// reach it.
#[derive(Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct GcsSpec {
    #[garde(length(min = 1))]
    pub bucket: String,
    #[garde(skip)]
    pub prefix: Option<String>,
    #[garde(skip)]
    pub restore_from: Option<String>,
    #[garde(skip)]
    pub restore_bucket: Option<String>,
    #[garde(dive)]
    pub service_account: ServiceAccountSpec,
}

#[derive(Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct ServiceAccountSpec {
    #[garde(dive)]
    pub secret_key_ref: SecretKeyRef,
}

/// Pointer to a key inside a same-namespace Kubernetes secret.
#[derive(Validate, Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct SecretKeyRef {
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(length(min = 1))]
    pub key: String,
}

/// Observability-only status subresource; the reconcile loop never reads it
/// back to make decisions.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct MongoClusterStatus {
    pub observed_generation: Option<i64>,
    pub phase: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec(replicas: i32) -> MongoClusterConfigurationSpec {
        MongoClusterConfigurationSpec {
            mongodb: MongoDbSpec {
                replicas,
                cpu_limit: None,
                cpu_request: None,
                memory_limit: None,
                memory_request: None,
                storage_class_name: None,
                storage_name: None,
                storage_size: None,
                storage_data_path: None,
                wired_tiger_cache_size: None,
            },
            backups: None,
        }
    }

    #[test]
    fn replica_bounds_are_enforced() {
        assert!(minimal_spec(2).validate(&()).is_err());
        assert!(minimal_spec(3).validate(&()).is_ok());
        assert!(minimal_spec(50).validate(&()).is_ok());
        assert!(minimal_spec(51).validate(&()).is_err());
    }
}
