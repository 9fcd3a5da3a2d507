//! C1: the validated, defaulted in-memory view of a declared cluster
//! resource. Parsed once at the boundary from [`crate::crd`] so the rest of
//! the operator never has to reason about optional fields or naming
//! conventions again.

use garde::Validate;
use kube::ResourceExt;
use operator_api::consts::{
    DEFAULT_BACKUP_PREFIX, DEFAULT_CPU_LIMIT, DEFAULT_CPU_REQUEST, DEFAULT_MEMORY_LIMIT,
    DEFAULT_MEMORY_REQUEST, DEFAULT_STORAGE_DATA_PATH, DEFAULT_STORAGE_NAME, DEFAULT_STORAGE_SIZE,
};

use crate::crd::MongoClusterConfiguration;
use crate::error::InvalidSpecError;

/// `(cluster-name, namespace)` — the key used throughout the operator to
/// identify a cluster in the ephemeral caches.
pub type ClusterKey = (String, String);

/// Validated, defaulted cluster declaration.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub name: String,
    pub namespace: String,
    pub resource_version: String,
    pub replicas: i32,
    pub container: ContainerSizing,
    pub storage: StorageSizing,
    pub backup: Option<BackupPolicy>,
}

#[derive(Debug, Clone)]
pub struct ContainerSizing {
    pub cpu_limit: String,
    pub cpu_request: String,
    pub memory_limit: String,
    pub memory_request: String,
    pub wired_tiger_cache_size: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageSizing {
    pub name: String,
    pub size: String,
    pub mount_path: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupPolicy {
    pub cron: String,
    pub bucket: String,
    pub prefix: String,
    pub restore_from: Option<String>,
    pub restore_bucket: Option<String>,
    pub credentials: SecretRef,
}

#[derive(Debug, Clone)]
pub struct SecretRef {
    pub name: String,
    pub key: String,
}

impl ClusterSpec {
    #[must_use]
    pub fn key(&self) -> ClusterKey {
        (self.name.clone(), self.namespace.clone())
    }

    /// Stable per-ordinal DNS hostname of replica-set member `ordinal`,
    /// served by the headless service plus the stateful workload.
    #[must_use]
    pub fn member_hostname(&self, ordinal: i32) -> String {
        member_hostname(ordinal, &self.name, &self.namespace)
    }

    /// The bucket backups should be restored from: `restore_bucket` if set,
    /// otherwise the primary backup bucket.
    #[must_use]
    pub fn restore_bucket(&self) -> Option<&str> {
        self.backup.as_ref().map(|b| {
            b.restore_bucket
                .as_deref()
                .unwrap_or(b.bucket.as_str())
        })
    }
}

/// `memberHostname(i, cluster, namespace)` from spec.md §4.2, available as a
/// free function since the backup/restore coordinators need it without a
/// full `ClusterSpec` in scope.
#[must_use]
pub fn member_hostname(ordinal: i32, cluster: &str, namespace: &str) -> String {
    format!("{cluster}-{ordinal}.{cluster}.{namespace}.svc.cluster.local")
}

/// Parses and validates a `MongoClusterConfiguration`, applying the defaults
/// listed in spec.md §6. Returns `InvalidSpecError` rather than panicking or
/// throwing, per the tagged-error re-architecture note.
pub fn parse_cluster_spec(
    resource: &MongoClusterConfiguration,
) -> Result<ClusterSpec, InvalidSpecError> {
    resource
        .spec
        .validate(&())
        .map_err(InvalidSpecError::Validation)?;

    let name = resource.name_any();
    let namespace = resource
        .namespace()
        .ok_or(InvalidSpecError::MissingField(".metadata.namespace"))?;
    let resource_version = resource
        .resource_version()
        .ok_or(InvalidSpecError::MissingField(".metadata.resourceVersion"))?;

    let mongodb = &resource.spec.mongodb;
    let container = ContainerSizing {
        cpu_limit: mongodb.cpu_limit.clone().unwrap_or_else(|| DEFAULT_CPU_LIMIT.to_owned()),
        cpu_request: mongodb
            .cpu_request
            .clone()
            .unwrap_or_else(|| DEFAULT_CPU_REQUEST.to_owned()),
        memory_limit: mongodb
            .memory_limit
            .clone()
            .unwrap_or_else(|| DEFAULT_MEMORY_LIMIT.to_owned()),
        memory_request: mongodb
            .memory_request
            .clone()
            .unwrap_or_else(|| DEFAULT_MEMORY_REQUEST.to_owned()),
        wired_tiger_cache_size: mongodb.wired_tiger_cache_size.clone(),
    };
    let storage = StorageSizing {
        name: mongodb
            .storage_name
            .clone()
            .unwrap_or_else(|| DEFAULT_STORAGE_NAME.to_owned()),
        size: mongodb
            .storage_size
            .clone()
            .unwrap_or_else(|| DEFAULT_STORAGE_SIZE.to_owned()),
        mount_path: mongodb
            .storage_data_path
            .clone()
            .unwrap_or_else(|| DEFAULT_STORAGE_DATA_PATH.to_owned()),
        class_name: mongodb.storage_class_name.clone(),
    };

    let backup = resource
        .spec
        .backups
        .as_ref()
        .map(|backups| -> Result<BackupPolicy, InvalidSpecError> {
            let secret_ref = &backups.gcs.service_account.secret_key_ref;
            Ok(BackupPolicy {
                cron: backups.cron.clone(),
                bucket: backups.gcs.bucket.clone(),
                prefix: backups
                    .gcs
                    .prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BACKUP_PREFIX.to_owned()),
                restore_from: backups.gcs.restore_from.clone(),
                restore_bucket: backups.gcs.restore_bucket.clone(),
                credentials: SecretRef {
                    name: secret_ref.name.clone(),
                    key: secret_ref.key.clone(),
                },
            })
        })
        .transpose()?;

    Ok(ClusterSpec {
        name,
        namespace,
        resource_version,
        replicas: mongodb.replicas,
        container,
        storage,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_hostname_matches_wire_format() {
        assert_eq!(
            member_hostname(0, "mongo-cluster", "default"),
            "mongo-cluster-0.mongo-cluster.default.svc.cluster.local"
        );
    }
}
