//! C8: one-shot `mongorestore` from the configured bucket, fired once per
//! cluster per process lifetime when the replica set first becomes writable
//! (spec.md §4.8).

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ReconcileError, StorageError};
use crate::model::ClusterSpec;
use crate::state::RestoreLedger;
use crate::storage_gateway::StorageGateway;
use operator_api::consts::RESTORE_FROM_LATEST;

/// spec.md §4.8: `mongorestore` is retried up to 4 times, 15s apart, before
/// giving up on a restore attempt.
const RESTORE_RETRIES: u32 = 4;
const RESTORE_WAIT: Duration = Duration::from_secs(15);

pub struct RestoreCoordinator {
    storage: StorageGateway,
}

impl RestoreCoordinator {
    #[must_use]
    pub fn new(storage: StorageGateway) -> Self {
        Self { storage }
    }

    /// `RestoreIfNeeded(spec)`: no-op unless a backup policy is configured
    /// and this cluster has not already had a restore claimed this process.
    pub async fn restore_if_needed(&self, spec: &ClusterSpec, ledger: &RestoreLedger) -> Result<(), ReconcileError> {
        let Some(policy) = &spec.backup else {
            return Ok(());
        };
        let Some(restore_from) = &policy.restore_from else {
            return Ok(());
        };
        if !ledger.claim(&spec.key()) {
            return Ok(());
        }

        let bucket = spec.restore_bucket().unwrap_or(policy.bucket.as_str()).to_owned();
        let object_name = if restore_from == RESTORE_FROM_LATEST {
            self.storage.latest(&bucket, &policy.prefix, &policy.credentials).await?
        } else {
            restore_from.clone()
        };

        info!(cluster = %spec.name, namespace = %spec.namespace, %object_name, "restoring backup");
        let local_path = std::env::temp_dir().join(&object_name);
        self.storage
            .download(&bucket, &policy.prefix, &policy.credentials, &object_name, &local_path)
            .await?;

        let hosts = (0..spec.replicas)
            .map(|ordinal| spec.member_hostname(ordinal))
            .collect::<Vec<_>>()
            .join(",");
        let result = self.restore(&hosts, &local_path).await;
        if let Err(err) = tokio::fs::remove_file(&local_path).await {
            warn!(path = %local_path.display(), %err, "failed to remove local restore file");
        }
        result?;
        info!(cluster = %spec.name, namespace = %spec.namespace, %object_name, "restore complete");
        Ok(())
    }

    /// `hosts` is the comma-joined list of every current member hostname
    /// (spec.md §4.8: "resolve current member hostnames").
    async fn restore(&self, hosts: &str, local_path: &std::path::Path) -> Result<(), ReconcileError> {
        let mut attempt = 0;
        loop {
            let status = tokio::process::Command::new("mongorestore")
                .arg("--host")
                .arg(hosts)
                .arg("--gzip")
                .arg(format!("--archive={}", local_path.display()))
                .status()
                .await
                .map_err(StorageError::Io)?;
            if status.success() {
                return Ok(());
            }
            if attempt >= RESTORE_RETRIES {
                return Err(ReconcileError::SubprocessFailure("mongorestore", status));
            }
            attempt += 1;
            warn!(attempt, max = RESTORE_RETRIES, "mongorestore failed, retrying");
            tokio::time::sleep(RESTORE_WAIT).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupPolicy, ContainerSizing, SecretRef, StorageSizing};

    fn sample_spec(restore_from: Option<&str>) -> ClusterSpec {
        ClusterSpec {
            name: "mongo-cluster".to_owned(),
            namespace: "default".to_owned(),
            resource_version: "1".to_owned(),
            replicas: 3,
            container: ContainerSizing {
                cpu_limit: "100m".to_owned(),
                cpu_request: "100m".to_owned(),
                memory_limit: "64Mi".to_owned(),
                memory_request: "64Mi".to_owned(),
                wired_tiger_cache_size: None,
            },
            storage: StorageSizing {
                name: "mongo-storage".to_owned(),
                size: "30Gi".to_owned(),
                mount_path: "/data/db".to_owned(),
                class_name: None,
            },
            backup: Some(BackupPolicy {
                cron: "0 0 * * * *".to_owned(),
                bucket: "primary-bucket".to_owned(),
                prefix: "backups".to_owned(),
                restore_from: restore_from.map(str::to_owned),
                restore_bucket: None,
                credentials: SecretRef {
                    name: "gcs-creds".to_owned(),
                    key: "key.json".to_owned(),
                },
            }),
        }
    }

    #[test]
    fn restore_is_skipped_when_unconfigured() {
        let spec = sample_spec(None);
        assert!(spec.backup.as_ref().unwrap().restore_from.is_none());
    }

    #[test]
    fn restore_bucket_falls_back_to_primary() {
        let spec = sample_spec(Some("latest"));
        assert_eq!(spec.restore_bucket(), Some("primary-bucket"));
    }
}
